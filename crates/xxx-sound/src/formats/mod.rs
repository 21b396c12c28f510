pub mod xxx;
