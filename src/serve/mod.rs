mod datagram;
mod error;
mod object;
mod subgroup;
mod track;
mod tracks;

pub use datagram::*;
pub use error::*;
pub use object::*;
pub use subgroup::*;
pub use track::*;
pub use tracks::*;
