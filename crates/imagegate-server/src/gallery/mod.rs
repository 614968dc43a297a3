mod store;

pub use store::GalleryStore;
