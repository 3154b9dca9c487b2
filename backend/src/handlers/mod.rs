pub mod connections;
pub mod incidents;
pub mod lineage;
pub mod system;
pub mod tables;
pub mod websocket;
