use crate::hw_def::*;
use crate::types::*;

#[cfg(feature = "async")]
use crate::bus::AsyncOneWire;
#[cfg(feature = "blocking")]
use crate::bus::OneWire;

use crc::{Crc, CRC_8_MAXIM_DOW};

const CRC: crc::Crc<u8> = Crc::<u8>::new(&CRC_8_MAXIM_DOW);

/// Check the scratchpad CRC and decode the 12 bit temperature
///
/// Bytes 0 and 1 hold the temperature LSB first; byte 8 is the Dallas/Maxim CRC-8 over
/// bytes 0 to 7.
pub fn decode_scratchpad(scratchpad: &[u8; SCRATCHPAD_LEN]) -> Result<CentiCelsius, ProtocolError> {
    let expected = CRC.checksum(&scratchpad[..SCRATCHPAD_LEN - 1]);
    let found = scratchpad[SCRATCHPAD_LEN - 1];
    if found != expected {
        return Err(ProtocolError::CrcMismatch { expected, found });
    }
    // no masking needed in 12 bit mode
    let raw = i16::from_le_bytes([scratchpad[0], scratchpad[1]]);
    Ok(CentiCelsius::from_raw(raw))
}

impl Ds18b20 {
    /// Create a sensor handle for the device at `address`
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    /// Get the device ROM address
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Start a temperature conversion. Allow up to 750 ms before reading the result.
    #[cfg(feature = "blocking")]
    pub fn start_conversion<B: OneWire>(&self, bus: &mut B) -> Result<(), Error<B::Error>> {
        bus.reset().map_err(Error::Bus)?;
        bus.select(&self.address).map_err(Error::Bus)?;
        bus.write_byte(CMD_CONVERT_T).map_err(Error::Bus)?;
        Ok(())
    }

    /// Read the raw scratchpad without checking it
    #[cfg(feature = "blocking")]
    pub fn read_scratchpad<B: OneWire>(&self, bus: &mut B) -> Result<[u8; SCRATCHPAD_LEN], Error<B::Error>> {
        bus.reset().map_err(Error::Bus)?;
        bus.select(&self.address).map_err(Error::Bus)?;
        bus.write_byte(CMD_READ_SCRATCHPAD).map_err(Error::Bus)?;
        let mut scratchpad = [0u8; SCRATCHPAD_LEN];
        for byte in scratchpad.iter_mut() {
            *byte = bus.read_byte().map_err(Error::Bus)?;
        }
        Ok(scratchpad)
    }

    /// Read the result of the last conversion
    #[cfg(feature = "blocking")]
    pub fn read_temperature<B: OneWire>(&self, bus: &mut B) -> Result<CentiCelsius, Error<B::Error>> {
        let scratchpad = self.read_scratchpad(bus)?;
        Ok(self.checked(&scratchpad)?)
    }

    /// Start a temperature conversion. Allow up to 750 ms before reading the result.
    #[cfg(feature = "async")]
    pub async fn start_conversion_async<B: AsyncOneWire>(&self, bus: &mut B) -> Result<(), Error<B::Error>> {
        bus.reset().await.map_err(Error::Bus)?;
        bus.select(&self.address).await.map_err(Error::Bus)?;
        bus.write_byte(CMD_CONVERT_T).await.map_err(Error::Bus)?;
        Ok(())
    }

    /// Read the raw scratchpad without checking it
    #[cfg(feature = "async")]
    pub async fn read_scratchpad_async<B: AsyncOneWire>(&self, bus: &mut B) -> Result<[u8; SCRATCHPAD_LEN], Error<B::Error>> {
        bus.reset().await.map_err(Error::Bus)?;
        bus.select(&self.address).await.map_err(Error::Bus)?;
        bus.write_byte(CMD_READ_SCRATCHPAD).await.map_err(Error::Bus)?;
        let mut scratchpad = [0u8; SCRATCHPAD_LEN];
        for byte in scratchpad.iter_mut() {
            *byte = bus.read_byte().await.map_err(Error::Bus)?;
        }
        Ok(scratchpad)
    }

    /// Read the result of the last conversion
    #[cfg(feature = "async")]
    pub async fn read_temperature_async<B: AsyncOneWire>(&self, bus: &mut B) -> Result<CentiCelsius, Error<B::Error>> {
        let scratchpad = self.read_scratchpad_async(bus).await?;
        Ok(self.checked(&scratchpad)?)
    }

    fn checked(&self, scratchpad: &[u8; SCRATCHPAD_LEN]) -> Result<CentiCelsius, ProtocolError> {
        decode_scratchpad(scratchpad).inspect_err(|err| {
            warn!("ds18b20 {:?}: {:?}, scratchpad={:?}", self.address, err, scratchpad);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_crc(mut scratchpad: [u8; SCRATCHPAD_LEN]) -> [u8; SCRATCHPAD_LEN] {
        scratchpad[SCRATCHPAD_LEN - 1] = CRC.checksum(&scratchpad[..SCRATCHPAD_LEN - 1]);
        scratchpad
    }

    #[test]
    fn crc_matches_dallas_reference_vector() {
        // ROM code from the Maxim application note 27 example
        assert_eq!(CRC.checksum(&[0x02, 0x1C, 0xB8, 0x01, 0x00, 0x00, 0x00]), 0xA2);
    }

    #[test]
    fn decodes_85_degrees() {
        // 1360 = 0x0550
        let scratchpad = with_crc([0x50, 0x05, 0x4B, 0x46, 0x7F, 0xFF, 0x0C, 0x10, 0x00]);
        assert_eq!(decode_scratchpad(&scratchpad), Ok(CentiCelsius(8500)));
    }

    #[test]
    fn decodes_negative_temperature() {
        // -10.125 °C = 0xFF5E
        let scratchpad = with_crc([0x5E, 0xFF, 0x4B, 0x46, 0x7F, 0xFF, 0x0C, 0x10, 0x00]);
        assert_eq!(decode_scratchpad(&scratchpad), Ok(CentiCelsius(-1012)));
    }

    #[test]
    fn rejects_corrupted_scratchpad() {
        let mut scratchpad = with_crc([0x50, 0x05, 0x4B, 0x46, 0x7F, 0xFF, 0x0C, 0x10, 0x00]);
        let good_crc = scratchpad[8];
        scratchpad[0] ^= 0x01;
        assert_eq!(
            decode_scratchpad(&scratchpad),
            Err(ProtocolError::CrcMismatch {
                expected: CRC.checksum(&scratchpad[..8]),
                found: good_crc,
            })
        );
    }
}
