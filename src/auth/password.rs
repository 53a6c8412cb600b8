use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use subtle::ConstantTimeEq;


const SALT_BYTES: usize = 16;
const HASH_BYTES: usize = 32;
#[cfg(not(test))]
const ROUNDS: u32 = 100_000;
#[cfg(test)]
const ROUNDS: u32 = 1_000;


pub const MAX_PASSWORD_CHARS: usize = 200;


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordHash {
    pub salt: String,
    pub hash: String,
}


pub fn hash_password(password: &str) -> PasswordHash {
    let salt = rand::random::<[u8; SALT_BYTES]>();
    PasswordHash {
        salt: hex::encode(salt),
        hash: hex::encode(derive(password, &salt)),
    }
}


pub fn verify_password(password: &str, salt: &str, hash: &str) -> bool {
    let (Ok(salt), Ok(expected)) = (hex::decode(salt), hex::decode(hash)) else {
        return false;
    };
    if expected.len() != HASH_BYTES {
        return false;
    }
    let actual = derive(password, &salt);
    bool::from(actual.ct_eq(&expected[..]))
}

fn derive(password: &str, salt: &[u8]) -> [u8; HASH_BYTES] {
    let mut out = [0u8; HASH_BYTES];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, ROUNDS, &mut out);
    out
}
