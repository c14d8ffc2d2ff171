//! HTTP server layer for cog-glui.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │   GET /tiles/{z}/{x}/{y}.{format}    GET /index.html, ...       │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │  handlers   │  │  templates  │  │        routes           │  │
//! │  │ (requests)  │  │ (mapbox-gl) │  │  (router config)        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;
pub mod templates;

pub use handlers::{
    fallback_handler, index_handler, playground_handler, tile_handler, AppState, ErrorResponse,
    TilePath, TilePathParams, TileQueryParams, TILE_CACHE_CONTROL,
};
pub use routes::{create_router, RouterConfig};
pub use templates::{render_index, render_playground, PageParams};
