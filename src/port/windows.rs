//! Win32 serial port using overlapped I/O.
//!
//! Every read and write is issued with an `OVERLAPPED` and then waited on
//! together with a manual-reset closing event. `close` signals that event and
//! cancels outstanding I/O, so a blocked read returns an empty result.

use super::error::PortError;
use super::traits::{BaudRate, DataBits, Parity, PortSettings, SerialDevice, StopBits};
use parking_lot::{Mutex, RwLock};
use std::ffi::OsStr;
use std::io;
use std::os::windows::ffi::OsStrExt;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace};
use winapi::shared::minwindef::{DWORD, FALSE, TRUE};
use winapi::shared::winerror::{
    ERROR_ACCESS_DENIED, ERROR_FILE_NOT_FOUND, ERROR_IO_PENDING, ERROR_OPERATION_ABORTED,
    ERROR_PATH_NOT_FOUND, ERROR_SHARING_VIOLATION,
};
use winapi::um::commapi::{
    ClearCommError, EscapeCommFunction, GetCommState, PurgeComm, SetCommState, SetCommTimeouts,
};
use winapi::um::errhandlingapi::GetLastError;
use winapi::um::fileapi::{CreateFileW, ReadFile, WriteFile, OPEN_EXISTING};
use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
use winapi::um::ioapiset::{CancelIoEx, GetOverlappedResult};
use winapi::um::minwinbase::OVERLAPPED;
use winapi::um::synchapi::{
    CreateEventW, ResetEvent, SetEvent, WaitForMultipleObjects, WaitForSingleObject,
};
use winapi::um::winbase::{
    CLRDTR, CLRRTS, COMMTIMEOUTS, COMSTAT, DCB, DTR_CONTROL_DISABLE, EVENPARITY,
    FILE_FLAG_OVERLAPPED, INFINITE, MARKPARITY, NOPARITY, ODDPARITY, ONESTOPBIT, PURGE_RXABORT,
    PURGE_RXCLEAR, PURGE_TXABORT, PURGE_TXCLEAR, RTS_CONTROL_DISABLE, SETDTR, SETRTS,
    SPACEPARITY, TWOSTOPBITS, WAIT_OBJECT_0,
};
use winapi::um::winnt::{GENERIC_READ, GENERIC_WRITE, HANDLE};

const XON: i8 = 0x11;
const XOFF: i8 = 0x13;

/// Owned Win32 handle, closed on drop.
#[derive(Debug)]
struct Handle(HANDLE);

// Kernel handles may be used from any thread.
unsafe impl Send for Handle {}
unsafe impl Sync for Handle {}

impl Drop for Handle {
    fn drop(&mut self) {
        if !self.0.is_null() && self.0 != INVALID_HANDLE_VALUE {
            unsafe { CloseHandle(self.0) };
        }
    }
}

#[derive(Debug)]
struct Handles {
    file: Handle,
    read_event: Handle,
    write_event: Handle,
    closing_event: Handle,
}

/// Serial port backed by a Win32 communications handle.
#[derive(Debug)]
pub struct WindowsPort {
    name: String,
    handles: RwLock<Option<Handles>>,
    /// An `OVERLAPPED` and its event serve one operation at a time.
    read_serial: Mutex<()>,
    write_serial: Mutex<()>,
    closing: AtomicBool,
    rts: AtomicBool,
    dtr: AtomicBool,
}

/// Every parity mode maps onto a DCB value on Windows.
pub fn supports_parity(_parity: Parity) -> bool {
    true
}

/// Checks a complete line configuration without touching any device.
pub fn validate_settings(settings: &PortSettings) -> Result<(), PortError> {
    check_frame(settings.data_bits, settings.stop_bits)
}

/// The UART driver refuses two stop bits with five data bits.
fn check_frame(data_bits: DataBits, stop_bits: StopBits) -> Result<(), PortError> {
    if data_bits == DataBits::Five && stop_bits == StopBits::Two {
        return Err(PortError::invalid_config(
            "5 data bits cannot be combined with 2 stop bits",
        ));
    }
    Ok(())
}

impl WindowsPort {
    /// Open and configure a COM port for overlapped I/O.
    ///
    /// # Errors
    /// - `InvalidPort` if the name is empty, missing or already in use
    /// - `InvalidConfig` if the line parameters are unsupported
    /// - `Device` if any communications call fails
    pub fn open(settings: &PortSettings) -> Result<Self, PortError> {
        let name = settings.port_name.trim();
        if name.is_empty() {
            return Err(PortError::invalid_port("no serial port selected"));
        }
        validate_settings(settings)?;

        let path = if name.starts_with(r"\\.\") {
            name.to_string()
        } else {
            format!(r"\\.\{name}")
        };
        let wide: Vec<u16> = OsStr::new(&path).encode_wide().chain(Some(0)).collect();

        let raw = unsafe {
            CreateFileW(
                wide.as_ptr(),
                GENERIC_READ | GENERIC_WRITE,
                0,
                ptr::null_mut(),
                OPEN_EXISTING,
                FILE_FLAG_OVERLAPPED,
                ptr::null_mut(),
            )
        };
        if raw == INVALID_HANDLE_VALUE {
            return Err(open_error(name, unsafe { GetLastError() }));
        }
        // Handles close themselves on every early return below.
        let file = Handle(raw);
        let handles = Handles {
            read_event: create_event()?,
            write_event: create_event()?,
            closing_event: create_event()?,
            file,
        };

        let mut dcb = get_comm_state(&handles.file)?;
        configure_dcb(&mut dcb, settings);
        set_comm_state(&handles.file, &dcb)?;

        // All-zero timeouts: a read completes once the requested bytes arrive.
        let mut timeouts = COMMTIMEOUTS {
            ReadIntervalTimeout: 0,
            ReadTotalTimeoutMultiplier: 0,
            ReadTotalTimeoutConstant: 0,
            WriteTotalTimeoutMultiplier: 0,
            WriteTotalTimeoutConstant: 0,
        };
        if unsafe { SetCommTimeouts(handles.file.0, &mut timeouts) } == FALSE {
            return Err(PortError::last_os_error("SetCommTimeouts"));
        }
        let purge = PURGE_TXCLEAR | PURGE_TXABORT | PURGE_RXCLEAR | PURGE_RXABORT;
        if unsafe { PurgeComm(handles.file.0, purge) } == FALSE {
            return Err(PortError::last_os_error("PurgeComm"));
        }

        debug!(
            port = name,
            baud = settings.baud_rate.bps(),
            data_bits = u8::from(settings.data_bits),
            parity = %settings.parity,
            stop_bits = settings.stop_bits.count(),
            "serial port opened"
        );

        Ok(Self {
            name: name.to_string(),
            handles: RwLock::new(Some(handles)),
            read_serial: Mutex::new(()),
            write_serial: Mutex::new(()),
            closing: AtomicBool::new(false),
            rts: AtomicBool::new(false),
            dtr: AtomicBool::new(false),
        })
    }

    fn with_handles<T>(
        &self,
        f: impl FnOnce(&Handles) -> Result<T, PortError>,
    ) -> Result<T, PortError> {
        let guard = self.handles.read();
        match guard.as_ref() {
            Some(handles) => f(handles),
            None => Err(PortError::NotOpen),
        }
    }

    /// Read-modify-write of the current DCB.
    fn update_dcb(&self, f: impl FnOnce(&mut DCB) -> Result<(), PortError>) -> Result<(), PortError> {
        self.with_handles(|h| {
            let mut dcb = get_comm_state(&h.file)?;
            f(&mut dcb)?;
            set_comm_state(&h.file, &dcb)
        })
    }

    fn escape(&self, function: DWORD) -> Result<(), PortError> {
        self.with_handles(|h| {
            if unsafe { EscapeCommFunction(h.file.0, function) } == FALSE {
                return Err(PortError::last_os_error("EscapeCommFunction"));
            }
            Ok(())
        })
    }

    fn is_closing(&self, h: &Handles) -> bool {
        self.closing.load(Ordering::Acquire)
            || unsafe { WaitForSingleObject(h.closing_event.0, 0) } == WAIT_OBJECT_0
    }

    fn closing_or_not_open(&self) -> Result<Vec<u8>, PortError> {
        if self.closing.load(Ordering::Acquire) {
            Ok(Vec::new())
        } else {
            Err(PortError::NotOpen)
        }
    }

    /// Issue one overlapped read; `None` means the port is closing.
    fn read_chunk(&self, h: &Handles, len: usize) -> Result<Option<Vec<u8>>, PortError> {
        let mut buf = vec![0u8; len];
        let mut ov: OVERLAPPED = unsafe { std::mem::zeroed() };
        ov.hEvent = h.read_event.0;
        unsafe { ResetEvent(ov.hEvent) };

        let mut n: DWORD = 0;
        let ok = unsafe {
            ReadFile(
                h.file.0,
                buf.as_mut_ptr().cast(),
                len as DWORD,
                &mut n,
                &mut ov,
            )
        };
        if ok == FALSE {
            let code = unsafe { GetLastError() };
            if code != ERROR_IO_PENDING {
                if code == ERROR_OPERATION_ABORTED || self.is_closing(h) {
                    return Ok(None);
                }
                return Err(PortError::device("ReadFile", os_error(code)));
            }
            if !self.wait_io(h, &mut ov, &mut n, "ReadFile")? {
                return Ok(None);
            }
        }
        buf.truncate(n as usize);
        Ok(Some(buf))
    }

    /// Wait for a pending operation or the closing event.
    ///
    /// Returns `false` when the operation was abandoned because of `close`.
    /// The operation has always finished before this returns, so the caller's
    /// `OVERLAPPED` and buffer may be released.
    fn wait_io(
        &self,
        h: &Handles,
        ov: &mut OVERLAPPED,
        n: &mut DWORD,
        op: &'static str,
    ) -> Result<bool, PortError> {
        let events = [h.closing_event.0, ov.hEvent];
        let which = unsafe { WaitForMultipleObjects(2, events.as_ptr(), FALSE, INFINITE) };
        if which != WAIT_OBJECT_0 + 1 {
            let wait_error = io::Error::last_os_error();
            unsafe {
                CancelIoEx(h.file.0, ov);
                GetOverlappedResult(h.file.0, ov, n, TRUE);
            }
            if which == WAIT_OBJECT_0 || self.is_closing(h) {
                trace!(port = %self.name, op, "I/O cancelled");
                return Ok(false);
            }
            return Err(PortError::device("WaitForMultipleObjects", wait_error));
        }
        if unsafe { GetOverlappedResult(h.file.0, ov, n, TRUE) } == FALSE {
            let code = unsafe { GetLastError() };
            if code == ERROR_OPERATION_ABORTED || self.is_closing(h) {
                return Ok(false);
            }
            return Err(PortError::device(op, os_error(code)));
        }
        Ok(true)
    }
}

impl SerialDevice for WindowsPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_open(&self) -> bool {
        self.handles.read().is_some()
    }

    fn read(&self) -> Result<Vec<u8>, PortError> {
        let _serial = self.read_serial.lock();
        let guard = self.handles.read();
        let Some(h) = guard.as_ref() else {
            return self.closing_or_not_open();
        };

        let mut data = Vec::new();
        loop {
            let wanted = comm_status(&h.file)?.cbInQue.max(1) as usize;
            match self.read_chunk(h, wanted)? {
                Some(chunk) => data.extend_from_slice(&chunk),
                None => break,
            }
            if comm_status(&h.file)?.cbInQue == 0 {
                break;
            }
        }
        Ok(data)
    }

    fn write(&self, data: &[u8]) -> Result<usize, PortError> {
        if data.is_empty() {
            return Ok(0);
        }
        let _serial = self.write_serial.lock();
        let guard = self.handles.read();
        let Some(h) = guard.as_ref() else {
            return self.closing_or_not_open().map(|_| 0);
        };

        let mut ov: OVERLAPPED = unsafe { std::mem::zeroed() };
        ov.hEvent = h.write_event.0;
        unsafe { ResetEvent(ov.hEvent) };

        let mut n: DWORD = 0;
        let ok = unsafe {
            WriteFile(
                h.file.0,
                data.as_ptr().cast(),
                data.len() as DWORD,
                &mut n,
                &mut ov,
            )
        };
        if ok != FALSE {
            return Ok(n as usize);
        }
        match unsafe { GetLastError() } {
            ERROR_OPERATION_ABORTED => Ok(0),
            ERROR_IO_PENDING => {
                if self.wait_io(h, &mut ov, &mut n, "WriteFile")? {
                    Ok(n as usize)
                } else {
                    Ok(0)
                }
            }
            code => Err(PortError::device("WriteFile", os_error(code))),
        }
    }

    fn close(&self) -> Result<(), PortError> {
        if self.closing.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(h) = self.handles.read().as_ref() {
            unsafe {
                SetEvent(h.closing_event.0);
                CancelIoEx(h.file.0, ptr::null_mut());
            }
        }
        // Waits for in-flight reads and writes to observe the closing event.
        let handles = self.handles.write().take();
        drop(handles);
        debug!(port = %self.name, "serial port closed");
        Ok(())
    }

    fn set_baud_rate(&self, value: BaudRate) -> Result<(), PortError> {
        self.update_dcb(|dcb| {
            dcb.BaudRate = value.bps();
            Ok(())
        })
    }

    fn set_data_bits(&self, value: DataBits) -> Result<(), PortError> {
        self.update_dcb(|dcb| {
            check_frame(value, dcb_stop_bits(dcb))?;
            dcb.ByteSize = u8::from(value);
            Ok(())
        })
    }

    fn set_parity(&self, value: Parity) -> Result<(), PortError> {
        self.update_dcb(|dcb| {
            apply_parity(dcb, value);
            Ok(())
        })
    }

    fn set_stop_bits(&self, value: StopBits) -> Result<(), PortError> {
        self.update_dcb(|dcb| {
            let data_bits = DataBits::try_from(dcb.ByteSize)?;
            check_frame(data_bits, value)?;
            dcb.StopBits = stop_bits_code(value);
            Ok(())
        })
    }

    fn bytes_to_read(&self) -> Result<usize, PortError> {
        self.with_handles(|h| Ok(comm_status(&h.file)?.cbInQue as usize))
    }

    fn bytes_to_write(&self) -> Result<usize, PortError> {
        self.with_handles(|h| Ok(comm_status(&h.file)?.cbOutQue as usize))
    }

    fn rts(&self) -> Result<bool, PortError> {
        self.with_handles(|_| Ok(self.rts.load(Ordering::Acquire)))
    }

    fn set_rts(&self, on: bool) -> Result<(), PortError> {
        self.escape(if on { SETRTS } else { CLRRTS })?;
        self.rts.store(on, Ordering::Release);
        Ok(())
    }

    fn dtr(&self) -> Result<bool, PortError> {
        self.with_handles(|_| Ok(self.dtr.load(Ordering::Acquire)))
    }

    fn set_dtr(&self, on: bool) -> Result<(), PortError> {
        self.escape(if on { SETDTR } else { CLRDTR })?;
        self.dtr.store(on, Ordering::Release);
        Ok(())
    }
}

impl Drop for WindowsPort {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn os_error(code: DWORD) -> io::Error {
    io::Error::from_raw_os_error(code as i32)
}

fn open_error(name: &str, code: DWORD) -> PortError {
    match code {
        ERROR_FILE_NOT_FOUND | ERROR_PATH_NOT_FOUND => {
            PortError::invalid_port(format!("{name}: no such device"))
        }
        ERROR_ACCESS_DENIED | ERROR_SHARING_VIOLATION => {
            PortError::invalid_port(format!("{name}: already in use"))
        }
        _ => PortError::device("CreateFile", os_error(code)),
    }
}

/// Manual-reset, initially unsignalled event.
fn create_event() -> Result<Handle, PortError> {
    let raw = unsafe { CreateEventW(ptr::null_mut(), TRUE, FALSE, ptr::null()) };
    if raw.is_null() {
        return Err(PortError::last_os_error("CreateEvent"));
    }
    Ok(Handle(raw))
}

fn comm_status(file: &Handle) -> Result<COMSTAT, PortError> {
    let mut errors: DWORD = 0;
    let mut status: COMSTAT = unsafe { std::mem::zeroed() };
    if unsafe { ClearCommError(file.0, &mut errors, &mut status) } == FALSE {
        return Err(PortError::last_os_error("ClearCommError"));
    }
    Ok(status)
}

fn get_comm_state(file: &Handle) -> Result<DCB, PortError> {
    let mut dcb: DCB = unsafe { std::mem::zeroed() };
    dcb.DCBlength = std::mem::size_of::<DCB>() as DWORD;
    if unsafe { GetCommState(file.0, &mut dcb) } == FALSE {
        return Err(PortError::last_os_error("GetCommState"));
    }
    Ok(dcb)
}

fn set_comm_state(file: &Handle, dcb: &DCB) -> Result<(), PortError> {
    let mut dcb = *dcb;
    if unsafe { SetCommState(file.0, &mut dcb) } == FALSE {
        return Err(PortError::last_os_error("SetCommState"));
    }
    Ok(())
}

/// Binary mode, no flow control, RTS/DTR released.
fn configure_dcb(dcb: &mut DCB, settings: &PortSettings) {
    dcb.BaudRate = settings.baud_rate.bps();
    dcb.ByteSize = u8::from(settings.data_bits);
    dcb.StopBits = stop_bits_code(settings.stop_bits);
    apply_parity(dcb, settings.parity);

    dcb.set_fBinary(TRUE as DWORD);
    dcb.set_fOutxCtsFlow(0);
    dcb.set_fOutxDsrFlow(0);
    dcb.set_fDtrControl(DTR_CONTROL_DISABLE);
    dcb.set_fDsrSensitivity(0);
    dcb.set_fOutX(0);
    dcb.set_fInX(0);
    dcb.set_fErrorChar(0);
    dcb.set_fNull(0);
    dcb.set_fRtsControl(RTS_CONTROL_DISABLE);
    dcb.set_fAbortOnError(0);
    dcb.XonChar = XON;
    dcb.XoffChar = XOFF;
}

fn apply_parity(dcb: &mut DCB, parity: Parity) {
    dcb.Parity = match parity {
        Parity::None => NOPARITY,
        Parity::Odd => ODDPARITY,
        Parity::Even => EVENPARITY,
        Parity::Mark => MARKPARITY,
        Parity::Space => SPACEPARITY,
    };
    dcb.set_fParity(if parity == Parity::None { 0 } else { 1 });
}

fn stop_bits_code(bits: StopBits) -> u8 {
    match bits {
        StopBits::One => ONESTOPBIT,
        StopBits::Two => TWOSTOPBITS,
    }
}

fn dcb_stop_bits(dcb: &DCB) -> StopBits {
    if dcb.StopBits == TWOSTOPBITS {
        StopBits::Two
    } else {
        StopBits::One
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_five_bits_two_stop_rejected() {
        let mut settings = PortSettings::new("COM1");
        settings.data_bits = DataBits::Five;
        settings.stop_bits = StopBits::Two;
        assert!(matches!(
            validate_settings(&settings),
            Err(PortError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_missing_port() {
        let err = WindowsPort::open(&PortSettings::new("COM250")).unwrap_err();
        assert!(matches!(err, PortError::InvalidPort(_)), "got {err:?}");
    }

    #[test]
    fn test_dcb_parity_flag() {
        let mut dcb: DCB = unsafe { std::mem::zeroed() };
        apply_parity(&mut dcb, Parity::Mark);
        assert_eq!(dcb.Parity, MARKPARITY);
        assert_eq!(dcb.fParity(), 1);
        apply_parity(&mut dcb, Parity::None);
        assert_eq!(dcb.fParity(), 0);
    }
}
