pub mod directory;
pub mod geocoder;
pub mod sheets;

pub use directory::{
    DirectoryClient, DirectoryCustomField, DirectoryError, DirectoryUser, DirectoryUserEnvelope,
    CITY_FIELD, DEPARTMENT_FIELD, POSITION_FIELD,
};
pub use geocoder::{GeocoderClient, GeocoderError};
pub use sheets::{SheetClient, SheetError, SheetRow};
