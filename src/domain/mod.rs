// Market structure domain
pub mod market;

// Core trading domain
pub mod trading;

// Event envelope and payload types
pub mod events;

// Port interfaces (Exchange capability)
pub mod ports;

// Repository traits
pub mod repositories;

// Domain-specific error types
pub mod errors;
