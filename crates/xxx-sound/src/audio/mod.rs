pub mod mpeg;
