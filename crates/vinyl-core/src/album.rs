//! Album catalog entries.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A record in the album catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    /// Opaque unique identifier.
    pub id: String,
    /// Album title.
    pub title: String,
    /// Performing artist.
    pub artist: String,
    /// Price in the store's currency.
    pub price: f64,
}

/// Payload accepted by `POST /albums`.
///
/// Identifiers are always assigned by the service; an `id` in the payload is ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewAlbum {
    /// Album title.
    pub title: String,
    /// Performing artist.
    pub artist: String,
    /// Price in the store's currency.
    pub price: f64,
}

impl Album {
    /// Creates an album with a freshly generated identifier.
    #[must_use]
    pub fn new(title: impl Into<String>, artist: impl Into<String>, price: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            artist: artist.into(),
            price,
        }
    }

    /// The three albums the catalog starts with.
    #[must_use]
    pub fn seed() -> Vec<Self> {
        vec![
            Self::new("Blue Train", "John Coltrane", 56.99),
            Self::new("Jeru", "Gerry Mulligan", 17.99),
            Self::new("Sarah Vaughan and Clifford Brown", "Sarah Vaughan", 39.99),
        ]
    }
}

impl From<NewAlbum> for Album {
    fn from(new: NewAlbum) -> Self {
        Self::new(new.title, new.artist, new.price)
    }
}
