mod access_error;
mod access_state;
mod access_type;

pub use access_error::*;
pub use access_state::*;
pub use access_type::*;
