// Copyright (c) 2024 - 2026 Tristore Software, Inc.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Shared vocabulary types of the tristore middleware: the [`Blob`] buffer,
//! the closed data-type set, operation status codes and datastore ids.

mod blob;
mod data;
mod id;
mod ops;
mod status;

pub use blob::{Blob, BlobRef, UnpackError};
pub use data::DataType;
pub use id::DatastoreId;
pub use ops::GetOpCode;
pub use status::Status;
