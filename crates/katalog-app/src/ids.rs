// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Scalar;

macro_rules! entity_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub const fn get(self) -> i64 {
                self.0
            }

            /// Accepts positive integers only, either as a JSON number or
            /// as the decimal text a select widget stores.
            pub fn parse(raw: &str) -> Option<Self> {
                match raw.trim().parse::<i64>() {
                    Ok(value) if value > 0 => Some(Self(value)),
                    _ => None,
                }
            }

            pub fn from_scalar(value: &Scalar) -> Option<Self> {
                match value {
                    Scalar::Integer(value) if *value > 0 => Some(Self(*value)),
                    Scalar::Text(raw) => Self::parse(raw),
                    _ => None,
                }
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(LibraryId);
entity_id!(BookId);
entity_id!(ReaderId);
entity_id!(GenreId);
entity_id!(TopicId);
