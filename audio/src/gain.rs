//! Fixed-point volume and mute.
//!
//! Volumes are 8.8 values in units of dB, as exchanged with the host. Gains are linear factors scaled by 2^31.

// Volume settings go from -24576 to 0, in steps of 256.
pub const VOLUME_STEPS_PER_DB: i16 = 256;
pub const MIN_VOLUME_DB: i16 = -96;
pub const MAX_VOLUME_DB: i16 = 0;

pub const UNITY_GAIN: u32 = 0x8000_0000;

/// Linear gain per integer dB step, `round(10^(dB / 20) * 2^31)`, from -96 dB (index 0) to 0 dB (index 96).
pub static GAIN_TABLE: [u32; 97] = [
    0x000084f3, 0x0000952c, 0x0000a760, 0x0000bbcc, 0x0000d2b6, 0x0000ec6c, 0x00010945, 0x000129a4, 0x00014df5,
    0x000176b5, 0x0001a46d, 0x0001d7ba, 0x00021149, 0x000251de, 0x00029a55, 0x0002eba3, 0x000346dc, 0x0003ad38,
    0x00042010, 0x0004a0ec, 0x00053181, 0x0005d3bb, 0x000689bf, 0x000755fa, 0x00083b20, 0x00093c3b, 0x000a5cb6,
    0x000ba064, 0x000d0b91, 0x000ea30e, 0x00106c43, 0x00126d43, 0x0014acdb, 0x001732ae, 0x001a074f, 0x001d345b,
    0x0020c49c, 0x0024c42c, 0x002940a2, 0x002e4939, 0x0033ef0c, 0x003a454a, 0x00416179, 0x00495bc1, 0x00524f3b,
    0x005c5a4f, 0x00679f1c, 0x007443e8, 0x008273a6, 0x00925e89, 0x00a43aa2, 0x00b8449c, 0x00cec08a, 0x00e7facc,
    0x01044915, 0x01240b8c, 0x0147ae14, 0x016fa9bb, 0x019c8651, 0x01cedc3d, 0x0207567a, 0x0246b4e4, 0x028dcebc,
    0x02dd958a, 0x0337184e, 0x039b8719, 0x040c3714, 0x048aa70b, 0x05188480, 0x05b7b15b, 0x066a4a53, 0x0732ae18,
    0x08138562, 0x090fcbf8, 0x0a2adad2, 0x0b68737a, 0x0ccccccd, 0x0e5ca14c, 0x101d3f2e, 0x12149a60, 0x144960c5,
    0x16c310e3, 0x198a1357, 0x1ca7d768, 0x2026f310, 0x241346f6, 0x287a26c5, 0x2d6a866f, 0x32f52cff, 0x392ced8e,
    0x4026e73d, 0x47faccf0, 0x50c335d4, 0x5a9df7ac, 0x65ac8c2f, 0x721482c0, 0x80000000,
];

/// Looks up the linear gain for a volume.
///
/// Fractional dB round toward more attenuation, and values outside of the table are clamped.
pub fn gain_for_volume(volume_8q8_db: i16) -> u32 {
    let db = volume_8q8_db
        .div_euclid(VOLUME_STEPS_PER_DB)
        .clamp(MIN_VOLUME_DB, MAX_VOLUME_DB);

    GAIN_TABLE[(db - MIN_VOLUME_DB) as usize]
}

/// Feature unit channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Channel {
    Master = 0,
    Left = 1,
    Right = 2,
}

pub const CHANNEL_COUNT: usize = 3;

impl TryFrom<u8> for Channel {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Channel::Master),
            1 => Ok(Channel::Left),
            2 => Ok(Channel::Right),
            other => Err(other),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VolumeRange {
    pub min: i16,
    pub max: i16,
    pub resolution: i16,
}

/// Per-channel mute and volume, applied to interleaved stereo frames.
#[derive(Clone, Debug, Default)]
pub struct Mixer {
    is_muted: [bool; CHANNEL_COUNT],
    volume_8q8_db: [i16; CHANNEL_COUNT],
}

impl Mixer {
    /// Creates a mixer with all channels unmuted at 0 dB.
    pub const fn new() -> Self {
        Self {
            is_muted: [false; CHANNEL_COUNT],
            volume_8q8_db: [MAX_VOLUME_DB * VOLUME_STEPS_PER_DB; CHANNEL_COUNT],
        }
    }

    pub fn set_mute(&mut self, channel: Channel, muted: bool) {
        debug!("Set channel {} mute state: {}", channel as u8, muted);
        self.is_muted[channel as usize] = muted;
    }

    pub fn is_muted(&self, channel: Channel) -> bool {
        self.is_muted[channel as usize]
    }

    /// Stores the volume as given. Out-of-range values are only clamped when applied.
    pub fn set_volume(&mut self, channel: Channel, volume_8q8_db: i16) {
        debug!(
            "Set channel {} volume: {} dB",
            channel as u8,
            volume_8q8_db / VOLUME_STEPS_PER_DB
        );
        self.volume_8q8_db[channel as usize] = volume_8q8_db;
    }

    pub fn volume(&self, channel: Channel) -> i16 {
        self.volume_8q8_db[channel as usize]
    }

    /// The same range applies to every channel.
    pub fn volume_range(&self, _channel: Channel) -> VolumeRange {
        VolumeRange {
            min: MIN_VOLUME_DB * VOLUME_STEPS_PER_DB,
            max: MAX_VOLUME_DB * VOLUME_STEPS_PER_DB,
            resolution: VOLUME_STEPS_PER_DB,
        }
    }

    /// Effective (left, right, master) gains, with mute applied.
    pub fn gains(&self) -> (u32, u32, u32) {
        let master_muted = self.is_muted(Channel::Master);

        let side_gain = |channel: Channel| {
            if master_muted || self.is_muted(channel) {
                0
            } else {
                gain_for_volume(self.volume(channel))
            }
        };

        (
            side_gain(Channel::Left),
            side_gain(Channel::Right),
            gain_for_volume(self.volume(Channel::Master)),
        )
    }

    /// Scales interleaved left/right samples in place.
    pub fn apply(&self, samples: &mut [i32]) {
        let (left_gain, right_gain, master_gain) = self.gains();

        for frame in samples.chunks_exact_mut(2) {
            frame[0] = scale(scale(frame[0] as i64, left_gain), master_gain) as i32;
            frame[1] = scale(scale(frame[1] as i64, right_gain), master_gain) as i32;
        }
    }
}

#[inline]
fn scale(sample: i64, gain: u32) -> i64 {
    (sample * gain as i64) >> 31
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_shape() {
        assert_eq!(GAIN_TABLE[96], UNITY_GAIN);
        assert_eq!(GAIN_TABLE[0], 0x0000_84f3);
        assert!(GAIN_TABLE.windows(2).all(|w| w[0] < w[1]));

        // -6 dB is close to half.
        let half = GAIN_TABLE[90] as f32 / UNITY_GAIN as f32;
        assert!((half - 0.501).abs() < 0.001);
    }

    #[test]
    fn volume_lookup_rounds_down() {
        assert_eq!(gain_for_volume(0), UNITY_GAIN);
        assert_eq!(gain_for_volume(-256), GAIN_TABLE[95]);

        // -0.5 dB is treated as -1 dB.
        assert_eq!(gain_for_volume(-128), GAIN_TABLE[95]);
        assert_eq!(gain_for_volume(-257), GAIN_TABLE[94]);

        // Clamped to the table.
        assert_eq!(gain_for_volume(i16::MIN), GAIN_TABLE[0]);
        assert_eq!(gain_for_volume(512), UNITY_GAIN);
    }

    #[test]
    fn channel_from_index() {
        assert_eq!(Channel::try_from(1), Ok(Channel::Left));
        assert_eq!(Channel::try_from(3), Err(3));
    }

    #[test]
    fn volume_round_trip() {
        let mut mixer = Mixer::new();
        mixer.set_volume(Channel::Left, -1280);
        assert_eq!(mixer.volume(Channel::Left), -1280);
        assert_eq!(mixer.volume(Channel::Right), 0);

        assert_eq!(
            mixer.volume_range(Channel::Left),
            VolumeRange {
                min: -96 * 256,
                max: 0,
                resolution: 256
            }
        );
    }

    #[test]
    fn unity_is_transparent() {
        let mixer = Mixer::new();
        let mut samples = [i32::MAX, i32::MIN, 12345, -1];
        mixer.apply(&mut samples);
        assert_eq!(samples, [i32::MAX, i32::MIN, 12345, -1]);
    }

    #[test]
    fn mute_overrides_volume() {
        let mut mixer = Mixer::new();
        mixer.set_volume(Channel::Left, -5 * 256);
        mixer.set_mute(Channel::Left, true);

        let mut samples = [1 << 30, 1 << 30, -(1 << 30), -(1 << 30)];
        mixer.apply(&mut samples);
        assert_eq!(samples, [0, 1 << 30, 0, -(1 << 30)]);

        mixer.set_mute(Channel::Left, false);
        mixer.set_mute(Channel::Master, true);
        let mut samples = [1000, -1000];
        mixer.apply(&mut samples);
        assert_eq!(samples, [0, 0]);
    }

    #[test]
    fn channel_and_master_gains_stack() {
        let mut mixer = Mixer::new();
        mixer.set_volume(Channel::Right, -6 * 256);
        mixer.set_volume(Channel::Master, -6 * 256);

        let mut samples = [1 << 20, 1 << 20];
        mixer.apply(&mut samples);

        let right_once = ((1i64 << 20) * GAIN_TABLE[90] as i64) >> 31;
        let left = ((1i64 << 20) * GAIN_TABLE[90] as i64) >> 31;
        let right = (right_once * GAIN_TABLE[90] as i64) >> 31;
        assert_eq!(samples, [left as i32, right as i32]);
    }
}
