/// Server mixer volume for 100%, one unit per 1/65536 of full scale.
pub const SERVER_VOLUME_NORM: u32 = 0x10000;

/// Volume in backend-native units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Volume {
    /// One entry per channel.
    Server(Vec<u32>),
    Kernel { raw: i64, min: i64, max: i64 },
}

pub fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

impl Volume {
    pub fn normalized(&self) -> f64 {
        match self {
            Volume::Server(channels) => {
                if channels.is_empty() {
                    return 0.0;
                }
                let sum: u64 = channels.iter().map(|&c| c as u64).sum();
                let avg = sum as f64 / channels.len() as f64;
                clamp_unit(avg / SERVER_VOLUME_NORM as f64)
            }
            Volume::Kernel { raw, min, max } => {
                if max <= min {
                    return 0.0;
                }
                clamp_unit((raw - min) as f64 / (max - min) as f64)
            }
        }
    }

    /// Same shape (channel count or raw range), every channel at `v`.
    pub fn with_normalized(&self, v: f64) -> Volume {
        let v = clamp_unit(v);
        match self {
            Volume::Server(channels) => {
                let level = (v * SERVER_VOLUME_NORM as f64).round() as u32;
                Volume::Server(vec![level; channels.len()])
            }
            Volume::Kernel { min, max, .. } => {
                let span = (max - min).max(0);
                Volume::Kernel {
                    raw: min + (span as f64 * v).round() as i64,
                    min: *min,
                    max: *max,
                }
            }
        }
    }

    /// Smallest representable change in normalized terms.
    pub fn step(&self) -> f64 {
        match self {
            Volume::Server(_) => 1.0 / SERVER_VOLUME_NORM as f64,
            Volume::Kernel { min, max, .. } if max > min => 1.0 / (max - min) as f64,
            Volume::Kernel { .. } => 1.0,
        }
    }

    pub fn channels(&self) -> usize {
        match self {
            Volume::Server(channels) => channels.len(),
            Volume::Kernel { .. } => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_round_trip_within_one_step() {
        let base = Volume::Server(vec![0, 0]);
        for i in 0..=100 {
            let v = i as f64 / 100.0;
            let set = base.with_normalized(v);
            assert_eq!(set.channels(), 2);
            assert!((set.normalized() - v).abs() <= set.step(), "{v}");
        }
    }

    #[test]
    fn kernel_round_trip_within_one_step() {
        let base = Volume::Kernel {
            raw: 0,
            min: -12,
            max: 87,
        };
        for i in 0..=40 {
            let v = i as f64 / 40.0;
            let set = base.with_normalized(v);
            assert!((set.normalized() - v).abs() <= set.step(), "{v}");
        }
    }

    #[test]
    fn out_of_range_clamps() {
        let base = Volume::Server(vec![SERVER_VOLUME_NORM / 2]);
        assert_eq!(base.with_normalized(-0.3), base.with_normalized(0.0));
        assert_eq!(base.with_normalized(1.7), base.with_normalized(1.0));
        assert_eq!(base.with_normalized(f64::NAN), base.with_normalized(0.0));

        let kernel = Volume::Kernel {
            raw: 10,
            min: 0,
            max: 64,
        };
        assert_eq!(kernel.with_normalized(-0.3), kernel.with_normalized(0.0));
        assert_eq!(kernel.with_normalized(1.7), kernel.with_normalized(1.0));
    }

    #[test]
    fn uneven_channels_average() {
        let v = Volume::Server(vec![SERVER_VOLUME_NORM, 0]);
        assert!((v.normalized() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn overdrive_reads_as_full() {
        let v = Volume::Server(vec![SERVER_VOLUME_NORM * 3 / 2]);
        assert_eq!(v.normalized(), 1.0);
    }

    #[test]
    fn degenerate_kernel_range() {
        let v = Volume::Kernel {
            raw: 5,
            min: 5,
            max: 5,
        };
        assert_eq!(v.normalized(), 0.0);
        assert_eq!(v.with_normalized(0.8), v);
    }
}
