//! cc65 linker configuration parsing, and reconciliation of a linked output
//! file against the objects that produced it.

mod config;
mod options;
mod reconcile;
mod render;

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::path::Path;

use anyhow::Context;
use ariadne::{Cache, Config, IndexType, Label, Report, ReportKind, Source};
use indexmap::{IndexMap, IndexSet};
use serde::Deserialize;
use thiserror::Error;
use x16dbg_cc65::{ContainerError, FragmentKind, LibraryArchive, ObjectFile, Segment};
use x16dbg_debug::{AddressBinding, LineRef, SourceGraph, SourceId, SourceMapError};
use x16dbg_eval::{EvalContext, EvalError};

pub use self::config::{
    ConfigParseError, HEADER_LAST_SYMBOL, LinkerConfig, MemoryArea, ONCE_RUN_SYMBOL, ONCE_RUN_VALUE,
    OutputFile, SegmentConfig, SegmentKind, START_SYMBOL, load_config, load_config_with_options,
    parse_config,
};
pub use self::options::{PathRule, ReconcileOptions, load_options};
pub use self::reconcile::{AttributedByte, ReconcileError, SourceAttributedBinary, reconcile};
pub use self::render::{RenderOptions, render_attribution, render_config_error};
