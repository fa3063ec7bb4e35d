//! A neural-network guided Monte-Carlo tree search engine for 19x19 Go.
//!
//! The crate is the search core only: board rules (Tromp-Taylor, positional
//! superko), the shared search tree with PUCT selection and virtual losses,
//! the evaluation cache, and the feature/symmetry plumbing around an
//! external policy/value network. The network itself is anything that
//! implements [`network::Network`]; GTP framing, SGF files and training
//! pipelines live elsewhere.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use gozero::board::Color;
//! use gozero::config::EngineConfig;
//! use gozero::engine::Engine;
//! use gozero::network::UniformNet;
//!
//! let config = EngineConfig::new()
//!     .num_threads(1)
//!     .max_playouts(16)
//!     .noise(false);
//! let mut engine = Engine::new(config, Arc::new(UniformNet));
//! let mv = engine.genmove(Color::Black);
//! println!("engine plays {}", gozero::board::move_to_text(mv));
//! ```

pub mod board;
pub mod cache;
pub mod config;
pub mod engine;
pub mod network;
pub mod search;
pub mod state;
pub mod symmetry;
pub mod zobrist;
