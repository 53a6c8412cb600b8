use crate::core::error::{PostboardError, Result};


/// Short preview of user content for log lines.
#[inline]
pub fn safe_truncate_ellipsis(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    } else {
        s.to_string()
    }
}

/// Rejects blank values and values over `max_chars` characters.
pub fn require_text<'a>(field: &str, value: Option<&'a str>, max_chars: usize) -> Result<&'a str> {
    let value = value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| PostboardError::validation(format!("{field} is required")))?;
    ensure_max_chars(field, value, max_chars)?;
    Ok(value)
}


pub fn ensure_max_chars(field: &str, value: &str, max_chars: usize) -> Result<()> {
    if value.chars().count() > max_chars {
        return Err(PostboardError::validation(format!("{field} too long")));
    }
    Ok(())
}
