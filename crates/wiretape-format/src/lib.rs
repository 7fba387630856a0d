// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Fixture format shared by the wiretape recorders and replayers: canonical
//! JSON, the portable binary codec and the recorded data model.

pub mod body;
pub mod canonical;
mod error;
pub mod fixture;
mod model;

pub use body::{BinaryKind, PortableBinary};
pub use canonical::{canonicalize, canonicalize_pretty, to_canonical_pretty, to_canonical_string};
pub use error::{FormatError, Result};
pub use fixture::{from_fixture_str, to_fixture_string};
pub use model::*;
