pub mod analyze;
pub mod collect;
pub mod inspect;
pub mod train;
