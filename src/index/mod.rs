pub mod bloom;
pub mod dictionary;
pub mod forward;
pub mod inverted;
pub mod record_id_map;
