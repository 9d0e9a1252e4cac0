//! Scripting hook seam.
//!
//! An embedding application can intercept slash-commands and raw server
//! lines. A hook is handed to [`crate::app::state::AppState`] at
//! construction; there is no global registry.

pub trait ScriptHook: Send {
    /// Called with the upper-cased command name and its whitespace-split
    /// arguments before the built-in command table. Return `true` to consume.
    fn try_handle_command(&mut self, name: &str, args: &[String]) -> bool;

    /// Called for each raw line after the connection has processed it.
    /// Return `true` to keep the line's events away from channel state.
    fn try_handle_server_line(&mut self, server: &str, raw: &str) -> bool;
}
