// ============================================================================
// InpaintFE — mask-based photo inpainting front-end
// ============================================================================
//
// Library surface shared by the GUI binary and the headless CLI. The mask
// engine (canvas, components::history, session) is pure and synchronous;
// ops::inpaint speaks to the remote service; app wires both into eframe.

pub mod app;
pub mod canvas;
pub mod cli;
pub mod components;
pub mod config;
pub mod io;
pub mod logger;
pub mod ops;
pub mod session;
