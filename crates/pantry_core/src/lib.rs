pub mod auth;
pub mod clock;
pub mod domain;
pub mod editor;
pub mod error;
pub mod intake;
pub mod lifecycle;
pub mod ports;
pub mod store;

pub use auth::{AuthGateway, AuthSession, IdentityChange, Subscription};
pub use clock::{Clock, FixedClock, SystemClock};
pub use domain::{
    Category, Identity, Item, ItemDraft, ItemId, ProviderProfile, RawItem, ReceiptLine,
    ScannedReceipt, ShelfLife, User, UserCredentials, repair_item_ids,
};
pub use error::{PantryError, PantryResult, ValidationError};
pub use ports::{IdentityProvider, PantryBackend, PortError, PortResult, ReceiptScanner, ShelfLifeLookup};
pub use store::{DeleteAllOutcome, PantryStore, UseOutcome};
