//! SQLite-vec extension loader.
//!
//! The collection ranks rows with the `vec_distance_*` scalar functions, which
//! only exist on connections opened after this registration.

use std::ffi::c_char;
use std::sync::Once;

use rusqlite::ffi::{sqlite3, sqlite3_api_routines, sqlite3_auto_extension};
use sqlite_vec::sqlite3_vec_init;

type SqliteExtensionFn =
    unsafe extern "C" fn(*mut sqlite3, *mut *mut c_char, *const sqlite3_api_routines) -> i32;

static REGISTER: Once = Once::new();

/// Register sqlite-vec as an auto-loaded extension for all future connections.
///
/// Must run before the collection's connection is opened. Repeated calls are
/// no-ops.
#[allow(unsafe_code)]
pub fn init_sqlite_vec_extension() {
    REGISTER.call_once(|| {
        // SAFETY: sqlite3_auto_extension is a stable SQLite API; sqlite3_vec_init
        // is the extension entry point exported by the sqlite-vec crate and has
        // the signature SQLite expects for extension initializers.
        unsafe {
            sqlite3_auto_extension(Some(std::mem::transmute::<*const (), SqliteExtensionFn>(
                sqlite3_vec_init as *const (),
            )));
        }
    });
}
