mod archive;
mod error;
mod midi_codec;
mod model;
mod record;
mod util;

pub use archive::*;
pub use error::*;
pub use midi_codec::*;
pub use model::config::*;
pub use model::example::*;
pub use model::note::*;
pub use record::*;
pub use util::*;
