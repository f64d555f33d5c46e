//! Base addresses of modules loaded into the current process.

use crate::backend::Address;
use crate::error::{Error, Result};

/// Base address of the loaded module called `name`.
///
/// On Linux `name` is matched against the file name of each mapped file
/// (`libc.so.6`) or its full path, and the module base is the mapping of its
/// first page. On Windows it is looked up with `GetModuleHandleA`, so the
/// usual rules for module names apply (`kernel32.dll`, `kernel32`).
pub fn base_address(name: &str) -> Result<Address> {
    if name.is_empty() {
        return Err(Error::ModuleNotFound(name.to_string()));
    }
    sys::base_address(name)
}

#[cfg(target_os = "linux")]
mod sys {
    use tracing::debug;

    use crate::backend::Address;
    use crate::backend::maps;
    use crate::error::{Error, Result};

    pub(super) fn base_address(name: &str) -> Result<Address> {
        let entries = maps::read_self_maps()?;
        let entry = entries
            .iter()
            .filter(|entry| entry.offset == 0)
            .find(|entry| {
                entry.file_name() == Some(name) || entry.pathname.as_deref() == Some(name)
            })
            .ok_or_else(|| Error::ModuleNotFound(name.to_string()))?;
        debug!("Module {} mapped at 0x{:X}", name, entry.start);
        Ok(entry.start)
    }
}

#[cfg(target_os = "windows")]
mod sys {
    use std::ffi::CString;

    use tracing::debug;
    use windows::Win32::System::LibraryLoader::GetModuleHandleA;
    use windows::core::PCSTR;

    use crate::backend::Address;
    use crate::error::{Error, Result};

    pub(super) fn base_address(name: &str) -> Result<Address> {
        let c_name =
            CString::new(name).map_err(|_| Error::ModuleNotFound(name.to_string()))?;
        // SAFETY: c_name is a valid NUL-terminated string for the duration of the call.
        let handle = unsafe { GetModuleHandleA(PCSTR(c_name.as_ptr().cast())) }
            .map_err(|_| Error::ModuleNotFound(name.to_string()))?;
        let base = handle.0 as Address;
        debug!("Module {} mapped at 0x{:X}", name, base);
        Ok(base)
    }
}

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
mod sys {
    use crate::backend::Address;
    use crate::error::{Error, Result};

    pub(super) fn base_address(name: &str) -> Result<Address> {
        Err(Error::ModuleNotFound(name.to_string()))
    }
}
