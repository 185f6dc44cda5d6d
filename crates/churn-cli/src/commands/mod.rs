pub mod inspect;
pub mod predict;
pub mod remote;
pub mod template;
