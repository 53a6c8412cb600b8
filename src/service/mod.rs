mod mutations;
mod requests;

pub use mutations::MutationService;
pub use requests::{
    LoginRequest, LoginResponse, MAX_CONTENT_CHARS, MAX_NAME_CHARS, NewPost, NewUser, PostUpdate,
    UndoRequest, UserUpdate,
};
