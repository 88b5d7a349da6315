pub mod ela;
pub mod template;
