//! cellframe: retained-mode terminal UI core.
//!
//! A tree of widget nodes is laid out with a flex-style pass, painted into a
//! grid of styled grapheme cells, diffed against the previous frame and
//! flushed as a minimal escape-sequence stream. Raw input bytes are decoded
//! into key, mouse and paste events and routed through the tree.
//!
//! Module map:
//! - `buffer`, `types`: the cell grid and the values stored in it
//! - `tree`, `widget`, `style`: node arena, widget trait, style inheritance
//! - `layout`, `compositor`: geometry, overlay layers, hit testing
//! - `paint`, `render`, `ansi`: frame painting, diffing, escape emission
//! - `input`, `keys`, `event`: decoding, key bindings, dispatch and focus
//! - `terminal`, `scheduler`, `config`: backends and the render loop
//!
//! The crate logs through `tracing` and installs no subscriber.

pub mod ansi;
pub mod buffer;
pub mod compositor;
pub mod config;
pub mod error;
pub mod event;
pub mod input;
pub mod keys;
pub mod layout;
pub mod paint;
pub mod render;
pub mod scheduler;
pub mod style;
pub mod terminal;
mod text_utils;
pub mod tree;
pub mod types;
pub mod widget;

pub use buffer::{cells_equal, copy_region, Buffer};
pub use compositor::{Compositor, Layer};
pub use config::{EngineConfig, MouseMode};
pub use error::{EngineError, Result};
pub use event::{EventCtx, Handlers};
pub use input::{
    InputDecoder, InputEvent, KeyEvent, Modifiers, MouseAction, MouseButton, MouseEvent,
    ScrollDirection,
};
pub use keys::{match_key, parse_key_pattern, KeyPattern};
pub use layout::{
    bounds_intersect, bounds_intersection, compute, hit_test, point_in_bounds, Align, Dimension,
    Edges, FlexDirection, Justify, LayoutProps,
};
pub use paint::Surface;
pub use render::{BatchRenderer, Renderer};
pub use scheduler::{FrameStats, LoopState, RenderLoop};
pub use style::VisualStyle;
#[cfg(unix)]
pub use terminal::TtyBackend;
pub use terminal::{HeadlessBackend, TerminalBackend, TerminalModes};
pub use text_utils::display_width;
pub use tree::{Node, NodeId, NodeMut, Tree};
pub use types::{color, BorderStyle, Bounds, Cell, CellAttrs, Rgba, Style};
pub use widget::{BoxWidget, Spinner, Text, Widget};
