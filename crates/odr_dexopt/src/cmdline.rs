//! Argument vector construction.

/// Accumulates command line arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdlineBuilder {
    elements: Vec<String>,
}

impl CmdlineBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one argument.
    pub fn add(&mut self, arg: impl Into<String>) -> &mut Self {
        self.elements.push(arg.into());
        self
    }

    /// Appends a runtime option, passed through `--runtime-arg`.
    pub fn add_runtime(&mut self, arg: impl Into<String>) -> &mut Self {
        self.elements.push("--runtime-arg".to_string());
        self.elements.push(arg.into());
        self
    }

    /// Appends `flag` immediately followed by `value`, unless `value` is empty.
    pub fn add_if_non_empty(&mut self, flag: &str, value: &str) -> &mut Self {
        if !value.is_empty() {
            self.elements.push(format!("{flag}{value}"));
        }
        self
    }

    /// Appends `arg` when `condition` holds.
    pub fn add_if(&mut self, condition: bool, arg: impl Into<String>) -> &mut Self {
        if condition {
            self.elements.push(arg.into());
        }
        self
    }

    /// Appends every argument of `other`.
    pub fn concat(&mut self, other: CmdlineBuilder) -> &mut Self {
        self.elements.extend(other.elements);
        self
    }

    /// The arguments so far.
    pub fn get(&self) -> &[String] {
        &self.elements
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_in_order() {
        let mut tail = CmdlineBuilder::new();
        tail.add("-j4");

        let mut args = CmdlineBuilder::new();
        args.add("/system/bin/dex2oat")
            .add_runtime("-Xms64m")
            .add_if_non_empty("--cpu-set=", "0,1")
            .add_if_non_empty("--comments=", "")
            .add_if(true, "--compact-dex-level=none")
            .add_if(false, "--never")
            .concat(tail);

        assert_eq!(
            args.get(),
            [
                "/system/bin/dex2oat",
                "--runtime-arg",
                "-Xms64m",
                "--cpu-set=0,1",
                "--compact-dex-level=none",
                "-j4",
            ]
        );
    }
}
