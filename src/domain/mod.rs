pub mod calculations;
pub mod models;
pub mod observer;
pub mod registry;
pub mod settings;
pub mod steps;
