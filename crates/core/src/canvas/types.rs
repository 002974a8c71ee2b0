use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::colour::{colour_hash, Colour, DEFAULT_PALETTE};

/// Errors decoding downloaded snapshot data.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("invalid user info: {0}")]
    InvalidUser(String),

    #[error("{what} has {actual} bytes, expected {expected}")]
    SizeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Dimensions and palette of a canvas snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasMetadata {
    pub width: u32,
    pub height: u32,
    pub palette: Vec<Colour>,
}

impl CanvasMetadata {
    pub fn new(width: u32, height: u32, palette: Vec<Colour>) -> Self {
        Self {
            width,
            height,
            palette,
        }
    }

    /// Number of pixels, `None` if the dimensions overflow `usize`.
    pub fn pixel_count(&self) -> Option<usize> {
        (self.width as usize).checked_mul(self.height as usize)
    }

    /// Expected size of a per-pixel buffer of `bytes_per_pixel` wide entries.
    pub fn buffer_len(&self, bytes_per_pixel: usize) -> Result<usize, DecodeError> {
        self.pixel_count()
            .and_then(|n| n.checked_mul(bytes_per_pixel))
            .ok_or_else(|| {
                DecodeError::InvalidMetadata(format!(
                    "{}x{} canvas is too large",
                    self.width, self.height
                ))
            })
    }

    /// The palette to draw with, falling back to the default when empty.
    pub fn effective_palette(&self) -> &[Colour] {
        if self.palette.is_empty() {
            &DEFAULT_PALETTE
        } else {
            &self.palette
        }
    }
}

/// User info as served by the game server's `users/{id}` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub int_id: u32,
    #[serde(default)]
    pub chat_name: Option<String>,
    #[serde(default)]
    pub last_joined: i64,
    #[serde(default)]
    pub pixels_placed: u32,
    #[serde(default)]
    pub play_time_seconds: u32,
}

/// One of the top placers of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placer {
    pub int_id: u32,
    pub chat_name: Option<String>,
    /// Pixels owned in this snapshot.
    pub pixels_placed: u32,
    pub colour: Colour,
}

impl Placer {
    pub fn from_user(user: &User, pixels_placed: u32) -> Self {
        let colour = match &user.chat_name {
            Some(name) => colour_hash(name),
            None => colour_hash(&user.int_id.to_string()),
        };
        Self {
            int_id: user.int_id,
            chat_name: user.chat_name.clone(),
            pixels_placed,
            colour,
        }
    }

    /// Name shown in rendered images.
    pub fn display_name(&self) -> &str {
        self.chat_name.as_deref().unwrap_or("anonymous")
    }
}
