mod bounded_string;
mod decode;
mod encode;
mod integer;
mod kvp;
mod location;
mod string;
mod track_namespace;
mod tuple;
mod varint;

pub use bounded_string::*;
pub use decode::*;
pub use encode::*;
pub use kvp::*;
pub use location::*;
pub use track_namespace::*;
pub use tuple::*;
pub use varint::*;
