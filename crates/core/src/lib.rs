// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! beacon-core: shared kernel for the beacon experiment-tracking client

pub mod api;
pub mod clock;
pub mod history;
pub mod hostname;
pub mod id;
pub mod transport;

pub use api::{
    CommError, CommandArg, CommandKind, CommandResponse, PrepareResponse, RemoteApi, SweepCommand,
    SweepConfig, UploadPreparer, UploadSpec,
};
pub use clock::{Clock, FakeClock, SystemClock};
pub use history::HistoryRow;
pub use hostname::local_hostname;
pub use id::{AgentId, ArtifactId, RunId, SweepId};
pub use transport::{FileEntry, FilePolicy, Transport};
