use std::fmt;
use std::str::FromStr;

/// Switches for interpreter behaviour that differs between machines.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Quirks {
    /// `FILL` (FX65) stores registers to memory, the same as `DUMP`.
    pub legacy_fill: bool,
    /// `DRAW` sets VF when it turns a lit pixel off.
    pub collision: bool,
}

impl Quirks {
    fn entries(&self) -> [(&'static str, bool); 2] {
        [
            ("legacy-fill", self.legacy_fill),
            ("collision", self.collision),
        ]
    }
}

impl FromStr for Quirks {
    type Err = String;
    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let mut quirks = Self::default();
        for word in string.split(',').map(str::trim) {
            let value = match word {
                "" => continue,
                "legacy-fill" => &mut quirks.legacy_fill,
                "collision" => &mut quirks.collision,
                _ => return Err(format!("Unknown quirk '{}'", word)),
            };
            if *value {
                return Err(format!("Cannot specify quirk '{}' twice", word));
            }
            *value = true;
        }
        Ok(quirks)
    }
}

impl fmt::Display for Quirks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut has_any = false;
        for (name, value) in self.entries() {
            if !value {
                continue;
            }
            if has_any {
                write!(f, ",")?;
            }
            write!(f, "{}", name)?;
            has_any = true;
        }
        if !has_any {
            write!(f, "none")?;
        }
        Ok(())
    }
}
