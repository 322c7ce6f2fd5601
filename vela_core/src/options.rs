//! Runtime options consumed by the module subsystem.

/// How uses of deprecated bindings are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepWarn {
    /// Say nothing.
    Off,
    /// Print a `WARNING:` line to the diagnostic sink.
    #[default]
    Warn,
    /// Print, then raise `DeprecatedUse`.
    Error,
}

/// Options fixed at registry construction.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeOptions {
    pub depwarn: DepWarn,
    /// Incremental compilation: restored-module initializers run immediately
    /// even while generating output.
    pub incremental: bool,
    /// A compiled image is being produced; initializers are deferred to the
    /// init-order queue unless `incremental` is set.
    pub generating_output: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = RuntimeOptions::default();
        assert_eq!(opts.depwarn, DepWarn::Warn);
        assert!(!opts.incremental);
        assert!(!opts.generating_output);
    }
}
