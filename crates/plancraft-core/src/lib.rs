//! Plancraft Core - Orchestration for the design pipeline
//!
//! Takes one uploaded design asset through its remote processing stages:
//! - Upload classification (CAD drawing or raster floor plan)
//! - Whitebox generation, polled when the backend runs it as a task
//! - Batch rendering tagged by camera view
//! - Gallery navigation, download and refinement
//!
//! The remote services are reached through the `DesignServices` trait; the
//! `HttpDesignServices` implementation talks to the design backend's REST API.

pub mod config;
pub mod error;
pub mod gallery;
pub mod notify;
pub mod pipeline;
pub mod remote;
pub mod session;
pub mod studio;
pub mod views;

pub use config::{Config, Settings};
pub use error::{StudioError, StudioResult};
pub use gallery::{DownloadItem, GalleryCursor};
pub use notify::{Notice, NoticeKind, NotificationChannel};
pub use pipeline::{Fence, PipelineController, SessionSummary, StyleKey, StyleParams};
pub use remote::{DesignServices, HttpDesignServices};
pub use session::{Generation, PipelineSession, RenderEpoch, SourceFile, Stage, WorkflowStep};
pub use studio::Studio;
pub use views::{CameraView, ViewSelection};
