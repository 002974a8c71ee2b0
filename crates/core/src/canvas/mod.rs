//! Canvas snapshot data: palettes, metadata, placer maps and users.

mod colour;
mod decode;
mod types;

pub use colour::{colour_hash, Colour, DEFAULT_PALETTE};
pub use decode::{count_top_placers, parse_canvas, parse_metadata, parse_placers, parse_user};
pub use types::{CanvasMetadata, DecodeError, Placer, User};
