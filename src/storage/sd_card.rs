use embedded_sdmmc::{Error, Mode, SdCard, SdCardError, TimeSource, Timestamp, VolumeIdx, VolumeManager};
use log::{debug, warn};

use super::{FilePath, LogStorage, StorageError};
use crate::time::TimeBase;

use alloc::vec::Vec;

type SdFile<'a, S, D, T> = embedded_sdmmc::File<'a, SdCard<S, D>, T, 4, 4, 1>;

/// Read chunk size; one FAT sector
const READ_CHUNK: usize = 512;

/// Exposes the logger clock to the FAT layer for file timestamps
pub struct ClockTimeSource<C: TimeBase> {
    clock: C,
}

impl<C: TimeBase> ClockTimeSource<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: TimeBase> TimeSource for ClockTimeSource<C> {
    fn get_timestamp(&self) -> Timestamp {
        let now = self.clock.now();
        Timestamp {
            year_since_1970: (now.date.year.saturating_sub(1970)) as u8,
            zero_indexed_month: now.date.month.saturating_sub(1),
            zero_indexed_day: now.date.day.saturating_sub(1),
            hours: now.hour,
            minutes: now.minute,
            seconds: now.second,
        }
    }
}

fn map_err(e: Error<SdCardError>) -> StorageError {
    match e {
        Error::NotFound => StorageError::NotFound,
        other => StorageError::device(other),
    }
}

/// `LogStorage` on a FAT-formatted SD card. Operations are blocking; every
/// call opens the volume, walks to the file and closes everything again.
pub struct SdCardStorage<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    volume_mgr: VolumeManager<SdCard<S, D>, T, 4, 4, 1>,
}

impl<S, D, T> SdCardStorage<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    /// Create a new SD card storage manager
    pub fn new(sd_card: SdCard<S, D>, ts: T) -> Self {
        let volume_mgr = VolumeManager::new(sd_card, ts);

        Self { volume_mgr }
    }

    /// Open `path` in `mode` and run `op` on it. Missing directories are
    /// created when `create` is set, otherwise they surface as `NotFound`.
    fn with_file<R>(
        &self,
        path: &FilePath,
        mode: Mode,
        create: bool,
        op: impl FnOnce(&SdFile<'_, S, D, T>) -> Result<R, Error<SdCardError>>,
    ) -> Result<R, Error<SdCardError>> {
        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let mut dir = volume0.open_root_dir()?;

        for name in path.dirs() {
            let next = match dir.open_dir(name) {
                Ok(next) => next,
                Err(Error::NotFound) if create => {
                    debug!(" Creating directory {}", name);
                    dir.make_dir_in_dir(name)?;
                    dir.open_dir(name)?
                }
                Err(e) => return Err(e),
            }
            // Rebind to the volume manager so `next` doesn't borrow `dir`
            .to_raw_directory()
            .to_directory(&self.volume_mgr);
            dir.close()?;
            dir = next;
        }

        let file = dir.open_file_in_dir(path.name(), mode)?;
        let result = op(&file);

        // Resources are closed on drop as well; closing explicitly surfaces errors
        file.close()?;
        dir.close()?;
        volume0.close()?;

        result
    }
}

impl<S, D, T> LogStorage for SdCardStorage<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    fn is_ready(&mut self) -> bool {
        match self.volume_mgr.open_volume(VolumeIdx(0)) {
            Ok(volume) => volume.close().is_ok(),
            Err(e) => {
                warn!(" SD card not ready: {:?}", e);
                false
            }
        }
    }

    fn append(&mut self, path: &FilePath, data: &[u8]) -> Result<(), StorageError> {
        self.with_file(path, Mode::ReadWriteCreateOrAppend, true, |file| file.write(data))
            .map_err(map_err)
    }

    fn write(&mut self, path: &FilePath, data: &[u8]) -> Result<(), StorageError> {
        self.with_file(path, Mode::ReadWriteCreateOrTruncate, true, |file| file.write(data))
            .map_err(map_err)
    }

    fn read(&mut self, path: &FilePath, buf: &mut Vec<u8>) -> Result<bool, StorageError> {
        let result = self.with_file(path, Mode::ReadOnly, false, |file| {
            let mut chunk = [0u8; READ_CHUNK];
            loop {
                let bytes_read = file.read(&mut chunk)?;
                if bytes_read == 0 {
                    break; // EOF
                }
                buf.extend_from_slice(&chunk[..bytes_read]);
            }
            Ok(())
        });

        match result {
            Ok(()) => Ok(true),
            Err(Error::NotFound) => Ok(false),
            Err(e) => Err(map_err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{Date, DateTime, ManualClock};

    #[test]
    fn test_timestamp_from_clock() {
        let clock = ManualClock::new(DateTime::new(Date::new(2026, 10, 16), 7, 5, 9));
        let ts = ClockTimeSource::new(&clock).get_timestamp();
        assert_eq!(ts.year_since_1970, 56);
        assert_eq!(ts.zero_indexed_month, 9);
        assert_eq!(ts.zero_indexed_day, 15);
        assert_eq!((ts.hours, ts.minutes, ts.seconds), (7, 5, 9));
    }
}
