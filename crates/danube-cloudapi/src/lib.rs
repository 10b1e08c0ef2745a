//! Resource operations for the Danube Cloud API.
//!
//! Provides typed models and asynchronous operations for virtual machines,
//! images, networks, and services, plus the task-polling state machine the
//! asynchronous server operations are driven by. All calls dispatch through
//! [`danube_core::DanubeClient`].

#![deny(missing_docs)]

pub mod client;
pub mod images;
pub mod machines;
pub mod models;
pub mod networks;
pub mod services;
pub mod tasks;

pub use client::CloudApi;
pub use models::{
    CommonParams, CreateMachineOpts, DiskDefinition, GenericEntity, Image, ImageRepo,
    MachineDefinition, Network, NicDefinition, VmDetails, VmFilter,
};
pub use tasks::{CreateSnapshotOpts, TaskInfo, TaskResponse, TaskStatusSource, TaskWait};

/// Convenient result alias that reuses the shared Danube error type.
pub type Result<T> = danube_core::Result<T>;
