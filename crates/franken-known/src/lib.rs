#![forbid(unsafe_code)]

pub mod known_properties;
pub mod object_model;

pub use known_properties::{
    KnownProperties, KnownPropertyConfig, KnownPropertyError, KnownPropertyEvent,
    PrimitivePrototypes,
};
