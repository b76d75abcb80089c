//! Store - Format codecs, persistence, autosave and settings
//!
//! Every external format implements [`Codec`]: import bytes into a
//! [`DocumentSnapshot`], export a snapshot into bytes, and report what the
//! format could not carry in a [`FidelityReport`]. On top of the codecs
//! sit atomic file writes, background export, numbered autosave versions
//! and the editor settings file.

mod archive;
mod builder;
mod codec;
mod error;
mod fidelity;
mod format;
mod native;
mod text;
mod view;
mod xml;
mod file_io;
pub mod autosave;
pub mod background;
pub mod docx;
pub mod html;
pub mod odt;
pub mod pdf;
pub mod rtf;
pub mod settings;

pub use codec::*;
pub use error::*;
pub use fidelity::*;
pub use format::*;
pub use file_io::*;
pub use native::{decode as decode_native, encode as encode_native, FileHeader, FILE_EXTENSION, FORMAT_VERSION};

pub use autosave::{start_autosave, AutosaveHandle, AutosaveStore, AutosaveVersion};
pub use background::{
    notice_channel, spawn_export, spawn_export_with, BackgroundTask, CancelToken, ExportHandle,
    ExportJob, Notice, NoticeReceiver, NoticeSender,
};
pub use settings::{EditorSettings, SettingsManager};
