//! In-memory album catalog.

use parking_lot::RwLock;
use vinyl_core::{Album, NewAlbum};

/// The album collection served by the API.
///
/// Reads take a shared lock; additions take an exclusive one. Nothing is
/// persisted.
#[derive(Debug, Default)]
pub struct AlbumCatalog {
    albums: RwLock<Vec<Album>>,
}

impl AlbumCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog holding the seed albums.
    #[must_use]
    pub fn seeded() -> Self {
        Self::from_albums(Album::seed())
    }

    /// Creates a catalog holding `albums`.
    #[must_use]
    pub fn from_albums(albums: Vec<Album>) -> Self {
        Self {
            albums: RwLock::new(albums),
        }
    }

    /// Returns every album in insertion order.
    #[must_use]
    pub fn list(&self) -> Vec<Album> {
        self.albums.read().clone()
    }

    /// Looks up an album by identifier.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Album> {
        self.albums.read().iter().find(|a| a.id == id).cloned()
    }

    /// Adds an album with a fresh identifier and returns it.
    pub fn add(&self, new: NewAlbum) -> Album {
        let album = Album::from(new);
        self.albums.write().push(album.clone());
        album
    }

    /// Number of albums.
    #[must_use]
    pub fn len(&self) -> usize {
        self.albums.read().len()
    }

    /// Returns `true` if the catalog holds no albums.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.albums.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind_of_blue() -> NewAlbum {
        NewAlbum {
            title: "Kind of Blue".to_string(),
            artist: "Miles Davis".to_string(),
            price: 29.99,
        }
    }

    #[test]
    fn test_seeded_catalog() {
        let catalog = AlbumCatalog::seeded();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.list()[2].artist, "Sarah Vaughan");
    }

    #[test]
    fn test_add_then_get() {
        let catalog = AlbumCatalog::new();
        assert!(catalog.is_empty());

        let album = catalog.add(kind_of_blue());

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get(&album.id), Some(album));
    }

    #[test]
    fn test_get_unknown_id() {
        let catalog = AlbumCatalog::seeded();
        assert!(catalog.get("no-such-album").is_none());
    }

    #[test]
    fn test_add_appends_in_order() {
        let catalog = AlbumCatalog::seeded();
        let album = catalog.add(kind_of_blue());
        let albums = catalog.list();
        assert_eq!(albums.len(), 4);
        assert_eq!(albums[3].id, album.id);
    }
}
