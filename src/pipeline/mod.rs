//! Pipeline stages for report composition.
//!
//! Each submodule implements one transformation step and is testable on its
//! own. None of them perform I/O.
//!
//! ## Data Flow
//!
//! ```text
//! sanitize ──▶ wrap ──▶ layout ──▶ serialize
//!                         ▲
//!            normalize ───┘
//! ```
//!
//! 1. [`sanitize`]: reduce free text to characters the standard fonts can
//!    draw; also builds storage-safe file names
//! 2. [`metrics`]: Helvetica advance widths for line fitting
//! 3. [`wrap`]: greedy word wrap and line drawing with a cursor
//! 4. [`normalize`]: decode, orient, downscale and re-encode photos;
//!    CPU-bound, so the assembler runs it in `spawn_blocking`
//! 5. [`layout`]: place everything on A4 pages, breaking pages on overflow
//! 6. [`serialize`]: write the laid-out pages as PDF bytes with `lopdf`

pub mod layout;
pub mod metrics;
pub mod normalize;
pub mod sanitize;
pub mod serialize;
pub mod wrap;
