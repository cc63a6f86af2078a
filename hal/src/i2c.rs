//! I2C interface for Pacer HAL
//!
//! Linux `i2c-dev` access plus an ADXL345 three-axis accelerometer driver
//! and the [`MotionPlatform`] built on top of it.

use crate::{AccelerometerReading, HalError, MotionPlatform, ReadingStream, READING_CHANNEL_CAPACITY};
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// ioctl request selecting the slave address on an i2c-dev node
#[cfg(target_os = "linux")]
const I2C_SLAVE: libc::c_ulong = 0x0703;

/// I2C Bus wrapper
pub struct I2CBus {
    path: PathBuf,
    file: File,
}

impl I2CBus {
    /// Open I2C bus
    pub fn open(path: impl AsRef<Path>) -> Result<Self, HalError> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Bus device node
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Set slave address
    pub fn set_slave(&self, addr: u8) -> Result<(), HalError> {
        #[cfg(target_os = "linux")]
        {
            use std::os::unix::io::AsRawFd;
            // SAFETY: the descriptor is owned by `self.file` and stays open for the call.
            let ret = unsafe { libc::ioctl(self.file.as_raw_fd(), I2C_SLAVE as _, addr as libc::c_ulong) };
            if ret < 0 {
                return Err(HalError::CommunicationError(format!(
                    "Failed to set I2C slave address 0x{:02X} on {}",
                    addr,
                    self.path.display()
                )));
            }
        }
        Ok(())
    }

    /// Read bytes from the selected device
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, HalError> {
        use std::io::Read;
        (&self.file)
            .read(buf)
            .map_err(|e| HalError::CommunicationError(format!("I2C read failed: {}", e)))
    }

    /// Write bytes to the selected device
    pub fn write(&self, buf: &[u8]) -> Result<usize, HalError> {
        use std::io::Write;
        (&self.file)
            .write(buf)
            .map_err(|e| HalError::CommunicationError(format!("I2C write failed: {}", e)))
    }

    /// Read register
    pub fn read_register(&self, addr: u8, reg: u8) -> Result<u8, HalError> {
        let mut buf = [0u8; 1];
        self.read_registers(addr, reg, &mut buf)?;
        Ok(buf[0])
    }

    /// Write register
    pub fn write_register(&self, addr: u8, reg: u8, value: u8) -> Result<(), HalError> {
        self.set_slave(addr)?;
        self.write(&[reg, value])?;
        Ok(())
    }

    /// Read consecutive registers starting at `reg`
    pub fn read_registers(&self, addr: u8, reg: u8, buf: &mut [u8]) -> Result<usize, HalError> {
        self.set_slave(addr)?;
        self.write(&[reg])?;
        self.read(buf)
    }
}

/// ADXL345 three-axis accelerometer
pub struct ADXL345 {
    bus: I2CBus,
    address: u8,
}

impl ADXL345 {
    /// Default address with the ALT ADDRESS pin grounded
    pub const DEFAULT_ADDRESS: u8 = 0x53;
    /// Expected content of the DEVID register
    pub const DEVICE_ID: u8 = 0xE5;
    /// Full-resolution scale factor, g per LSB
    pub const SCALE_G_PER_LSB: f64 = 0.0039;

    const REG_DEVID: u8 = 0x00;
    const REG_BW_RATE: u8 = 0x2C;
    const REG_POWER_CTL: u8 = 0x2D;
    const REG_DATA_FORMAT: u8 = 0x31;
    const REG_DATAX0: u8 = 0x32;

    pub fn new(bus_path: impl AsRef<Path>, address: u8) -> Result<Self, HalError> {
        let bus = I2CBus::open(bus_path)?;
        Ok(Self { bus, address })
    }

    /// Read the DEVID register
    pub fn device_id(&self) -> Result<u8, HalError> {
        self.bus.read_register(self.address, Self::REG_DEVID)
    }

    /// Verify the chip answers and switch it to measurement mode
    pub fn init(&mut self) -> Result<(), HalError> {
        let id = self.device_id()?;
        if id != Self::DEVICE_ID {
            return Err(HalError::DeviceNotFound(format!(
                "unexpected ADXL345 device id 0x{:02X} at 0x{:02X}",
                id, self.address
            )));
        }

        // 12.5 Hz output data rate, full resolution +/-2 g, measure bit set
        self.bus.write_register(self.address, Self::REG_BW_RATE, 0x07)?;
        self.bus.write_register(self.address, Self::REG_DATA_FORMAT, 0x08)?;
        self.bus.write_register(self.address, Self::REG_POWER_CTL, 0x08)?;
        Ok(())
    }

    /// Put the chip back into standby
    pub fn standby(&self) -> Result<(), HalError> {
        self.bus.write_register(self.address, Self::REG_POWER_CTL, 0x00)
    }

    /// Read acceleration on all three axes, in g
    pub fn read_xyz(&self) -> Result<AccelerometerReading, HalError> {
        let mut buf = [0u8; 6];
        let n = self.bus.read_registers(self.address, Self::REG_DATAX0, &mut buf)?;
        if n < buf.len() {
            return Err(HalError::CommunicationError(format!(
                "short ADXL345 data read: {} of {} bytes",
                n,
                buf.len()
            )));
        }
        Ok(decode_axes(&buf))
    }
}

/// Decode the six little-endian DATAX0..DATAZ1 bytes
fn decode_axes(buf: &[u8; 6]) -> AccelerometerReading {
    let axis = |lo: u8, hi: u8| i16::from_le_bytes([lo, hi]) as f64 * ADXL345::SCALE_G_PER_LSB;
    AccelerometerReading::new(axis(buf[0], buf[1]), axis(buf[2], buf[3]), axis(buf[4], buf[5]))
}

/// A sensor the background poller can sample and park
trait PolledDevice: Send + 'static {
    fn read_xyz(&self) -> Result<AccelerometerReading, HalError>;
    fn standby(&self) -> Result<(), HalError>;
}

impl PolledDevice for ADXL345 {
    fn read_xyz(&self) -> Result<AccelerometerReading, HalError> {
        ADXL345::read_xyz(self)
    }

    fn standby(&self) -> Result<(), HalError> {
        ADXL345::standby(self)
    }
}

/// Sample `device` every `interval` until `stop` fires, its sender is
/// dropped, or the reading stream is closed. The device is put in standby
/// on every exit path.
fn spawn_poller<D: PolledDevice>(
    device: D,
    interval: Duration,
    tx: mpsc::Sender<AccelerometerReading>,
    mut stop: oneshot::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                biased;
                _ = &mut stop => break,
                _ = ticker.tick() => {}
            }

            match device.read_xyz() {
                Ok(reading) => {
                    tokio::select! {
                        biased;
                        _ = &mut stop => break,
                        sent = tx.send(reading) => {
                            if sent.is_err() {
                                break;
                            }
                        }
                    }
                }
                Err(e) => tracing::warn!("Failed to read accelerometer: {}", e),
            }
        }

        match device.standby() {
            Ok(()) => tracing::debug!("Accelerometer in standby"),
            Err(e) => tracing::debug!("Accelerometer standby failed: {}", e),
        }
    })
}

struct Poller {
    handle: JoinHandle<()>,
    /// Taken when the poller is asked to stop
    stop: Option<oneshot::Sender<()>>,
}

/// Motion platform backed by an ADXL345 on a Linux I2C bus
pub struct I2cAccelerometerPlatform {
    bus_path: PathBuf,
    address: u8,
    poller: Option<Poller>,
}

impl I2cAccelerometerPlatform {
    pub fn new(bus_path: impl Into<PathBuf>, address: u8) -> Self {
        Self {
            bus_path: bus_path.into(),
            address,
            poller: None,
        }
    }

    /// A stopped poller that has not yet parked the chip
    fn is_stopping(&self) -> bool {
        self.poller
            .as_ref()
            .map(|p| p.stop.is_none() && !p.handle.is_finished())
            .unwrap_or(false)
    }
}

#[async_trait::async_trait]
impl MotionPlatform for I2cAccelerometerPlatform {
    fn name(&self) -> &str {
        "adxl345"
    }

    async fn is_available(&self) -> bool {
        if !self.bus_path.exists() {
            return false;
        }

        let path = self.bus_path.clone();
        let address = self.address;
        let probe = tokio::task::spawn_blocking(move || -> Result<u8, HalError> {
            ADXL345::new(&path, address)?.device_id()
        })
        .await;

        match probe {
            Ok(Ok(id)) => id == ADXL345::DEVICE_ID,
            Ok(Err(e)) => {
                tracing::debug!("ADXL345 probe on {} failed: {}", self.bus_path.display(), e);
                false
            }
            Err(e) => {
                tracing::warn!("ADXL345 probe task failed: {}", e);
                false
            }
        }
    }

    async fn request_permission(&mut self) -> bool {
        // On Linux the authorization is access to the device node itself
        match OpenOptions::new().read(true).write(true).open(&self.bus_path) {
            Ok(_) => true,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                tracing::warn!("No read/write access to {}", self.bus_path.display());
                false
            }
            Err(e) => {
                tracing::warn!("Cannot open {}: {}", self.bus_path.display(), e);
                false
            }
        }
    }

    fn subscribe(&mut self, interval: Duration) -> Result<ReadingStream, HalError> {
        // The old poller's standby write must not land after our init
        if self.is_subscribed() || self.is_stopping() {
            return Err(HalError::DeviceBusy(self.bus_path.display().to_string()));
        }

        let mut sensor = ADXL345::new(&self.bus_path, self.address)?;
        sensor.init()?;

        let (tx, rx) = mpsc::channel(READING_CHANNEL_CAPACITY);
        let (stop_tx, stop_rx) = oneshot::channel();
        self.poller = Some(Poller {
            handle: spawn_poller(sensor, interval, tx, stop_rx),
            stop: Some(stop_tx),
        });

        tracing::info!("Subscribed to ADXL345 on {} every {:?}", self.bus_path.display(), interval);
        Ok(rx)
    }

    fn unsubscribe(&mut self) {
        let Some(poller) = self.poller.as_mut() else {
            return;
        };
        if let Some(stop) = poller.stop.take() {
            // Err means the poller already exited on its own
            let _ = stop.send(());
            tracing::info!("Unsubscribed from ADXL345 on {}", self.bus_path.display());
        }
    }

    fn is_subscribed(&self) -> bool {
        self.poller
            .as_ref()
            .map(|p| p.stop.is_some() && !p.handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for I2cAccelerometerPlatform {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_decode_axes_little_endian() {
        // x = +256 LSB, y = -256 LSB, z = +1 LSB
        let buf = [0x00, 0x01, 0x00, 0xFF, 0x01, 0x00];
        let reading = decode_axes(&buf);

        assert!((reading.x - 256.0 * ADXL345::SCALE_G_PER_LSB).abs() < 1e-12);
        assert!((reading.y + 256.0 * ADXL345::SCALE_G_PER_LSB).abs() < 1e-12);
        assert!((reading.z - ADXL345::SCALE_G_PER_LSB).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_missing_bus_is_unavailable() {
        let platform = I2cAccelerometerPlatform::new("/dev/does-not-exist-i2c-99", ADXL345::DEFAULT_ADDRESS);
        assert!(!platform.is_available().await);
        assert!(!platform.is_subscribed());
    }

    #[tokio::test]
    async fn test_missing_bus_denies_subscription() {
        let mut platform = I2cAccelerometerPlatform::new("/dev/does-not-exist-i2c-99", ADXL345::DEFAULT_ADDRESS);
        assert!(!platform.request_permission().await);
        assert!(platform.subscribe(Duration::from_millis(1000)).is_err());

        // Closing a platform that never opened is a no-op
        platform.unsubscribe();
        assert!(!platform.is_subscribed());
    }

    #[derive(Clone, Default)]
    struct FakeDevice {
        reads: Arc<AtomicUsize>,
        parked: Arc<AtomicBool>,
    }

    impl PolledDevice for FakeDevice {
        fn read_xyz(&self) -> Result<AccelerometerReading, HalError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(AccelerometerReading::new(0.0, 0.0, 1.0))
        }

        fn standby(&self) -> Result<(), HalError> {
            self.parked.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_signal_parks_device() {
        let device = FakeDevice::default();
        let (tx, mut rx) = mpsc::channel(READING_CHANNEL_CAPACITY);
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = spawn_poller(device.clone(), Duration::from_millis(100), tx, stop_rx);

        for _ in 0..3 {
            assert!(rx.recv().await.is_some());
        }
        assert!(!device.parked.load(Ordering::SeqCst));

        stop_tx.send(()).unwrap();
        handle.await.unwrap();

        assert!(device.parked.load(Ordering::SeqCst));
        let reads = device.reads.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(device.reads.load(Ordering::SeqCst), reads);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_stream_parks_device() {
        let device = FakeDevice::default();
        let (tx, rx) = mpsc::channel(READING_CHANNEL_CAPACITY);
        let (_stop_tx, stop_rx) = oneshot::channel();
        let handle = spawn_poller(device.clone(), Duration::from_millis(100), tx, stop_rx);

        drop(rx);
        handle.await.unwrap();
        assert!(device.parked.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_stop_sender_parks_device() {
        let device = FakeDevice::default();
        let (tx, _rx) = mpsc::channel(READING_CHANNEL_CAPACITY);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let handle = spawn_poller(device.clone(), Duration::from_millis(100), tx, stop_rx);

        drop(stop_tx);
        handle.await.unwrap();
        assert!(device.parked.load(Ordering::SeqCst));
    }
}
