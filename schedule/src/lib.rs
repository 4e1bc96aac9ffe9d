//! Client side of the schedule viewer: the typed gateway client, the selection
//! cascade and its controller, timetable loading and rendering, and persisted
//! client state.
pub mod cascade;
pub mod client;
pub mod controller;
pub mod state;
pub mod timetable;
pub mod types;
