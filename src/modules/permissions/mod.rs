pub mod controller;
pub mod registry;
pub mod router;
