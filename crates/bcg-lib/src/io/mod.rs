pub mod csv;
pub mod timefmt;
