//! Stage pipeline for one design upload.
//!
//! # Architecture
//!
//! ```text
//!  submit(file)
//!       │
//!       ├── .dxf ──► begin_structural_parse ──┬── done ────────────┐
//!       │                                     │                    │
//!       │                                     └── task ─► POLLER   │
//!       │                                                 (2s)     │
//!       │                                                  │       │
//!       └── other ─► store_asset ─► AwaitingSyncResult     │       │
//!                                        │                 │       │
//!                                  generate_whitebox       │       │
//!                                        │                 │       │
//!                                        ▼                 ▼       ▼
//!                                   ┌─────────────────────────────────┐
//!                                   │  PipelineController::apply      │
//!                                   │  (generation fence)             │
//!                                   └─────────────────────────────────┘
//!                                                 │
//!                                                 ▼
//!                                  WhiteboxReady ─► render_batch ─► GalleryReady
//! ```
//!
//! Every asynchronous result carries the generation it started under.
//! `apply` drops results from superseded generations before they touch the
//! session, so a restart never needs to cancel in-flight requests. Results
//! aimed at a render batch also carry its render epoch, so a new render
//! fences out refinements and failures of the batch it replaces.

mod controller;
mod poller;
mod render;
mod types;
mod upload;

pub use controller::{PipelineController, RenderTicket, RetryTicket, SessionSummary};
pub use poller::{PollConfig, TaskObserver, TaskPoller};
pub use render::{BatchRenderCoordinator, StyleKey, StyleParams, DEFAULT_STRENGTH};
pub use types::{Fence, RequestOrigin, SessionUpdate};
pub use upload::UploadCoordinator;
