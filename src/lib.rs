//! Map annotation core: draw markers, lines and polygons on a web map, edit
//! them, and save them as named GeoJSON documents per user.
//!
//! The crate owns everything behind the map widget: the in-memory geometry
//! model and its measurements, the drawing state machine, hit-testing for
//! selection, the GeoJSON serializer, and the persistence gateway that talks
//! to the file store. A host (browser shell, desktop app, or the bundled CLI)
//! forwards map input to [`engine::EngineCore`] and applies the resulting
//! [`engine::Action`]s to its map through [`widget::MapWidget`].
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`engine`] | Drawing controller and testable [`engine::EngineCore`] |
//! | [`doc`] | Shapes, properties, the geometry model and measurements |
//! | [`input`] | Drawing tools, UI state and the in-progress draft |
//! | [`hit`] | Hit-testing for selection and deletion |
//! | [`camera`] | Web Mercator projection for pixel-based hit slop |
//! | [`geojson`] | `FeatureCollection` export and lenient import |
//! | [`widget`] | Map widget seam and action dispatch |
//! | [`autosave`] | Save policy and auto-save debounce |
//! | [`services`] | Identity, file stores and the persistence gateway |
//! | [`config`] | Environment configuration |
//! | [`error`] | Shared error-code trait |
//! | [`consts`] | Shared numeric constants (radii, hit slop, defaults) |

pub mod autosave;
pub mod camera;
pub mod config;
pub mod consts;
pub mod doc;
pub mod engine;
pub mod error;
pub mod geojson;
pub mod hit;
pub mod input;
pub mod services;
pub mod widget;
