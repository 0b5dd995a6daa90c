//! libiio context implementing [`DeviceApi`](crate::DeviceApi).
//!
//! Built only with the `libiio` feature. Without it, opening a context
//! fails with [`JesdError::Unsupported`](crate::JesdError::Unsupported).

#[cfg(feature = "libiio")]
pub use imp::IioContext;

#[cfg(not(feature = "libiio"))]
pub use stub::IioContext;

#[cfg(feature = "libiio")]
#[allow(non_upper_case_globals, non_camel_case_types, non_snake_case, dead_code)]
mod ffi {
    include!(concat!(env!("OUT_DIR"), "/iio_bindings.rs"));
}

#[cfg(feature = "libiio")]
mod imp {
    use super::ffi;
    use crate::{ApiDevice, DeviceApi, JesdError, Result};
    use log::info;
    use std::{
        ffi::{CStr, CString},
        io,
        os::raw::c_char,
        ptr::NonNull,
    };

    /// Largest attribute the context reads in one go; lane records fit.
    const ATTR_BUF_SIZE: usize = 4096;

    /// An open libiio context, destroyed on drop.
    pub struct IioContext {
        ctx: NonNull<ffi::iio_context>,
        uri: Option<String>,
    }

    // The context is only ever used from the thread that owns it.
    unsafe impl Send for IioContext {}

    impl IioContext {
        /// Opens the context at `uri`, or the default local context.
        pub fn new(uri: Option<&str>) -> Result<Self> {
            let what = uri.unwrap_or("default context").to_owned();
            let ctx = match uri {
                Some(uri) => {
                    let c_uri = cstring(uri)?;
                    unsafe { ffi::iio_create_context_from_uri(c_uri.as_ptr()) }
                }
                None => unsafe { ffi::iio_create_default_context() },
            };
            let ctx = NonNull::new(ctx)
                .ok_or_else(|| JesdError::io(what.clone(), io::Error::last_os_error()))?;
            info!("opened libiio context {what}");
            Ok(Self {
                ctx,
                uri: uri.map(str::to_owned),
            })
        }

        pub fn uri(&self) -> Option<&str> {
            self.uri.as_deref()
        }

        fn device(&self, index: usize) -> Result<*const ffi::iio_device> {
            let dev = unsafe { ffi::iio_context_get_device(self.ctx.as_ptr(), index as _) };
            if dev.is_null() {
                Err(JesdError::NotFound(format!("iio device {index}")))
            } else {
                Ok(dev as *const _)
            }
        }
    }

    impl Drop for IioContext {
        fn drop(&mut self) {
            unsafe { ffi::iio_context_destroy(self.ctx.as_ptr()) };
        }
    }

    impl DeviceApi for IioContext {
        fn devices(&self) -> Vec<ApiDevice> {
            let count = unsafe { ffi::iio_context_get_devices_count(self.ctx.as_ptr()) } as usize;
            (0..count)
                .filter_map(|index| {
                    let dev = self.device(index).ok()?;
                    let id = unsafe { to_string(ffi::iio_device_get_id(dev)) }?;
                    Some(ApiDevice {
                        index,
                        id,
                        name: unsafe { to_string(ffi::iio_device_get_name(dev)) },
                        label: unsafe { to_string(ffi::iio_device_get_label(dev)) },
                    })
                })
                .collect()
        }

        fn attr_read(&self, index: usize, attr: &str) -> Result<String> {
            let dev = self.device(index)?;
            let c_attr = cstring(attr)?;
            let mut buf = vec![0u8; ATTR_BUF_SIZE];
            let ret = unsafe {
                ffi::iio_device_attr_read(
                    dev,
                    c_attr.as_ptr(),
                    buf.as_mut_ptr() as *mut c_char,
                    buf.len(),
                )
            };
            if ret < 0 {
                return Err(JesdError::from_errno(attr, ret as i32));
            }
            let text = CStr::from_bytes_until_nul(&buf)
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(&buf[..ret as usize]).into_owned());
            Ok(text)
        }

        fn attr_write(&self, index: usize, attr: &str, value: &str) -> Result<()> {
            let dev = self.device(index)?;
            let c_attr = cstring(attr)?;
            let c_value = cstring(value)?;
            let ret = unsafe { ffi::iio_device_attr_write(dev, c_attr.as_ptr(), c_value.as_ptr()) };
            if ret < 0 {
                return Err(JesdError::from_errno(attr, ret as i32));
            }
            Ok(())
        }
    }

    fn cstring(s: &str) -> Result<CString> {
        CString::new(s).map_err(|_| JesdError::InvalidDevice(s.to_owned()))
    }

    unsafe fn to_string(ptr: *const c_char) -> Option<String> {
        if ptr.is_null() {
            None
        } else {
            Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
        }
    }
}

#[cfg(not(feature = "libiio"))]
mod stub {
    use crate::{ApiDevice, DeviceApi, JesdError, Result};

    /// Placeholder when the crate is built without libiio.
    pub struct IioContext(());

    impl IioContext {
        pub fn new(_uri: Option<&str>) -> Result<Self> {
            Err(JesdError::Unsupported("libiio support not compiled in"))
        }

        pub fn uri(&self) -> Option<&str> {
            None
        }
    }

    impl DeviceApi for IioContext {
        fn devices(&self) -> Vec<ApiDevice> {
            Vec::new()
        }

        fn attr_read(&self, _index: usize, _attr: &str) -> Result<String> {
            Err(JesdError::Unsupported("libiio support not compiled in"))
        }

        fn attr_write(&self, _index: usize, _attr: &str, _value: &str) -> Result<()> {
            Err(JesdError::Unsupported("libiio support not compiled in"))
        }
    }
}

#[cfg(all(test, not(feature = "libiio")))]
mod tests {
    use super::*;

    #[test]
    fn context_is_unsupported_without_libiio() {
        let err = IioContext::new(Some("ip:192.168.2.1")).err().unwrap();
        assert!(matches!(err, crate::JesdError::Unsupported(_)));
        assert_eq!(err.errno(), -libc::ENOSYS);
    }
}
