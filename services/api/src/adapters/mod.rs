pub mod db;
pub mod memory;
pub mod ocr;
pub mod password;
pub mod shelf_life;

pub use db::DbAdapter;
pub use memory::MemoryStore;
pub use ocr::SampleReceiptScanner;
pub use shelf_life::SampleShelfLife;
