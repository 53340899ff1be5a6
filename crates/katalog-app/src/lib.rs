// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod catalog;
pub mod collate;
pub mod delete;
pub mod edit;
pub mod error;
pub mod forms;
pub mod grid;
pub mod ids;
pub mod layout;
pub mod model;
pub mod request;
pub mod state;

pub use catalog::*;
pub use delete::*;
pub use edit::*;
pub use error::*;
pub use forms::*;
pub use grid::*;
pub use ids::*;
pub use layout::*;
pub use model::*;
pub use request::*;
pub use state::*;
