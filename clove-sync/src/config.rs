//! Sync configuration.

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

/// Sync configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Capacity of the user-state event channel.
    ///
    /// Event sends never block the block loop; a receiver that falls more
    /// than this many events behind loses the oldest ones.
    pub event_channel_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: 256,
        }
    }
}

impl SyncConfig {
    fn serialized_version() -> u8 {
        0
    }

    /// Deserialize from `reader`.
    pub fn read<R: Read>(mut reader: R) -> std::io::Result<Self> {
        let _version = reader.read_u8()?;

        let event_channel_capacity = reader.read_u32::<BigEndian>()? as usize;
        if event_channel_capacity == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "event channel capacity must be non-zero",
            ));
        }

        Ok(Self {
            event_channel_capacity,
        })
    }

    /// Serialize into `writer`.
    pub fn write<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        writer.write_u8(Self::serialized_version())?;
        writer.write_u32::<BigEndian>(
            u32::try_from(self.event_channel_capacity).expect("capacity fits a u32"),
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_serialization_round_trip() {
        let config = SyncConfig {
            event_channel_capacity: 64,
        };
        let mut buf = Vec::new();
        config.write(&mut buf).unwrap();

        let read_back = SyncConfig::read(&buf[..]).unwrap();
        assert_eq!(read_back.event_channel_capacity, 64);
    }

    #[test]
    fn config_rejects_zero_capacity() {
        let config = SyncConfig {
            event_channel_capacity: 0,
        };
        let mut buf = Vec::new();
        config.write(&mut buf).unwrap();

        assert!(SyncConfig::read(&buf[..]).is_err());
    }
}
