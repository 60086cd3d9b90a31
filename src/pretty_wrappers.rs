/// A pretty-printer wrapper for how big something is in bytes.
///
/// The alternate form rounds to the nearest macro unit (kilobytes, megabytes,
/// etc..) so that arena sizes are easier to reason about in the logs. The
/// plain form is the exact byte count, which is what packing diagnostics need.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Default)]
pub struct PrettySize(pub u64);

const UNIT_NAMES: [&str; 5] = ["b", "kb", "mb", "gb", "tb"];

impl std::fmt::Debug for PrettySize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !f.alternate() {
            return f.write_fmt(format_args!("{}", self.0));
        }
        if self.0 < 1024 {
            return f.write_fmt(format_args!("{} b", self.0));
        }
        let size = self.0 as f64;
        let unit_pow = size.log(1024.0).clamp(0.0, 4.0).floor();
        let size_in_units = size / 1024.0_f64.powf(unit_pow);
        f.write_fmt(format_args!(
            "{:.2} {} ({} b)",
            size_in_units, UNIT_NAMES[unit_pow as usize], self.0
        ))
    }
}

impl std::fmt::Display for PrettySize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{:#?}", self))
    }
}

/// A pretty-printer wrapper for a memory type bitmask. Bits are printed in
/// binary so it's obvious which memory type indices are compatible.
#[derive(Copy, Clone, Eq, PartialEq, Default)]
pub struct PrettyBitflag(pub u32);

impl std::fmt::Debug for PrettyBitflag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{:#b}", self.0))
    }
}

impl std::fmt::Display for PrettyBitflag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{:?}", self))
    }
}

#[cfg(test)]
mod test {
    use {super::*, pretty_assertions::assert_eq};

    #[test]
    fn pretty_size_formats() {
        assert_eq!(format!("{:?}", PrettySize(362)), "362");
        assert_eq!(format!("{}", PrettySize(362)), "362 b");
        assert_eq!(format!("{}", PrettySize(2048)), "2.00 kb (2048 b)");
    }

    #[test]
    fn pretty_bitflag_formats() {
        let flag = PrettyBitflag(0b1010);
        assert_eq!(format!("{}", flag), "0b1010");
    }
}
