//! # Media Resizer
//!
//! An HTTP image resizing service. A client uploads a JPEG, PNG or GIF with
//! a target width and height; the service resizes it, stores the result, and
//! answers with a storage-relative path. Repeating the same upload is
//! answered from storage without decoding anything.
//!
//! # Architecture: Fingerprint, Lookup, Resize
//!
//! ```text
//! (bytes, media type, width, height, filename)
//!   → fingerprint → lookup ─ hit ──────────────────────────→ path
//!                          └ miss → resize → atomic write ─→ path
//! ```
//!
//! - **Fingerprint**: a 128-bit digest of the request identity, including a
//!   hash of the uploaded bytes. It doubles as the stored filename.
//! - **Lookup**: the storage directory is the cache. If
//!   `<fingerprint><ext>` exists, the work is done.
//! - **Resize**: JPEG and PNG go through a single-frame resample; GIF frames
//!   are composited, resampled, and re-quantized each against its own palette.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`types`] | Request and response types; the closed [`types::DeclaredFormat`] enum |
//! | [`fingerprint`] | Deterministic cache keys for resize requests |
//! | [`cache`] | Flat content-addressed store: lookup, atomic persist, per-key locks |
//! | [`imaging`] | Pure-Rust resize backends: static (JPEG/PNG) and animated (GIF) |
//! | [`pipeline`] | Dispatcher tying fingerprint, cache and backend together |
//! | [`server`] | axum HTTP boundary: multipart parsing, timeouts, status mapping |
//! | [`config`] | `config.toml` loading, validation, merging over stock defaults |
//!
//! # Design Decisions
//!
//! ## Content Is Part of the Key
//!
//! Keying on filename and size alone would serve one user's `photo.jpg` to
//! everyone who uploads a different `photo.jpg` at the same size. The
//! fingerprint therefore includes a SHA-256 of the bytes.
//!
//! ## Per-Frame Palettes
//!
//! Animated GIFs often switch color tables between frames. Each resized frame
//! is dithered back onto the table it was drawn with and written with its own
//! local palette, so no frame is forced through another frame's colors.
//!
//! ## No Eviction
//!
//! Stored results are never removed by the service. Disk usage grows with the
//! number of distinct requests; prune the storage directory externally if
//! needed. Any file can be deleted safely at any time: it is recomputed on the
//! next identical request.

pub mod cache;
pub mod config;
pub mod fingerprint;
pub mod imaging;
pub mod pipeline;
pub mod server;
pub mod types;
