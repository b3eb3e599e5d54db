pub mod eia;
pub mod nyserda;
