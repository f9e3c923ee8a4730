//! Frame buffer sizes as powers of two of 1 MiB.

use core::fmt;

#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub enum SizeWarning {
    /// Larger than the datasheet allows, programmed anyway.
    AboveOfficialCeiling { size_mb: u32 },
    /// Larger than the register can express, programmed as the largest size.
    Clamped { size_mb: u32, max_mb: u32 },
}

impl fmt::Display for SizeWarning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SizeWarning::AboveOfficialCeiling { size_mb } =>
                write!(f, "frame buffer size of {} MB not officially supported by the chipset", size_mb),
            SizeWarning::Clamped { size_mb, max_mb } =>
                write!(f, "frame buffer of {} MB too big, clamping to {} MB", size_mb, max_mb),
        }
    }
}

/// What a chipset can express: classes up to `max_class`, of which the datasheet
/// only documents those up to `official_max_class`.
#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub struct SizeLimits {
    pub max_class: u8,
    pub official_max_class: u8,
}

#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub struct SizeClass {
    /// log2 of the size in MiB, rounded up.
    pub class: u8,
    pub warning: Option<SizeWarning>,
}

impl SizeClass {
    /// The smallest class covering `size_kb`. Partial megabytes are ignored.
    pub fn for_size(size_kb: u32, limits: SizeLimits) -> SizeClass {
        let size_mb = size_kb / 1024;
        let max_mb = 1_u32 << limits.max_class;

        if size_mb > max_mb {
            return SizeClass {
                class: limits.max_class,
                warning: Some(SizeWarning::Clamped { size_mb, max_mb }),
            };
        }

        let mut class = 0;
        while (1_u32 << class) < size_mb {
            class += 1;
        }

        let warning = if class > limits.official_max_class {
            Some(SizeWarning::AboveOfficialCeiling { size_mb })
        } else {
            None
        };
        SizeClass { class, warning }
    }

    /// Log the warning, if any, and return the class.
    pub fn logged(self) -> u8 {
        if let Some(warning) = self.warning {
            warn!("[chipset] {}", warning);
        }
        self.class
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const ALI: SizeLimits = SizeLimits { max_class: 7, official_max_class: 4 };
    const SIS: SizeLimits = SizeLimits { max_class: 12, official_max_class: 12 };

    #[test]
    fn smallest_covering_class() {
        assert_eq!(SizeClass::for_size(1024, ALI).class, 0);
        assert_eq!(SizeClass::for_size(2048, ALI).class, 1);
        assert_eq!(SizeClass::for_size(3072, ALI).class, 2);
        assert_eq!(SizeClass::for_size(16384, ALI), SizeClass { class: 4, warning: None });
        // below one megabyte
        assert_eq!(SizeClass::for_size(512, ALI).class, 0);
    }

    #[test]
    fn above_official_ceiling() {
        assert_eq!(SizeClass::for_size(32768, ALI), SizeClass {
            class: 5,
            warning: Some(SizeWarning::AboveOfficialCeiling { size_mb: 32 }),
        });
        assert_eq!(SizeClass::for_size(128 * 1024, ALI).class, 7);
    }

    #[test]
    fn clamped() {
        assert_eq!(SizeClass::for_size(256 * 1024, ALI), SizeClass {
            class: 7,
            warning: Some(SizeWarning::Clamped { size_mb: 256, max_mb: 128 }),
        });
        assert_eq!(SizeClass::for_size(4 * 1024 * 1024, SIS), SizeClass { class: 12, warning: None });
    }

    #[test]
    fn monotonic_with_one_warning() {
        let mut last = 0;
        for size_mb in 1..=1024_u32 {
            let size = SizeClass::for_size(size_mb * 1024, ALI);
            assert!(size.class >= last);
            assert!(size.class <= ALI.max_class);
            assert_eq!(size.warning.is_some(), size_mb > 16);
            last = size.class;
        }
    }

    #[test]
    fn warning_text() {
        let warning = SizeWarning::Clamped { size_mb: 256, max_mb: 128 };
        assert_eq!(format!("{}", warning), "frame buffer of 256 MB too big, clamping to 128 MB");
    }
}
