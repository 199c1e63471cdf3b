use std::io::Write;

use super::{
    symbols::{is_global, Label, LabelKind},
    Linker, LinkerError,
};

/// Addresses, and global constants once they are resolved.
fn map_value(label: &Label) -> Option<u16> {
    match label.kind {
        LabelKind::Address => Some(label.addr),
        LabelKind::Constant { value: Some(value), .. } if is_global(&label.name) => {
            Some(value as u16)
        }
        _ => None,
    }
}

impl Linker {
    /// The symbol map: globals in link order, then every address label of each module.
    pub fn map_text(&self) -> String {
        let mut text = String::from("Globals\n-------\n");
        for module in self.ordered() {
            for label in module.labels.iter().filter(|l| is_global(&l.name)) {
                if let Some(value) = map_value(label) {
                    text.push_str(
                        format!("${:x} - {}:{}\n", value, module.fname, label.name).as_str(),
                    );
                }
            }
        }

        for module in self.ordered() {
            text.push_str(format!("\n{}\n-------\n", module.fname).as_str());
            for label in module.labels.iter().filter(|l| l.is_address()) {
                text.push_str(format!("${:x} - {}\n", label.addr, label.name).as_str());
            }
        }
        text
    }

    #[tracing::instrument(skip_all)]
    pub fn write_map(&self, out: &mut impl Write) -> Result<(), LinkerError> {
        let write_error = |e: std::io::Error| LinkerError::Write(e.to_string());
        out.write_all(self.map_text().as_bytes())
            .map_err(write_error)?;
        out.flush().map_err(write_error)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        assembler::{assemble, AssemblerConfig},
        linker::{Linker, LinkerConfig, LinkerError},
    };

    use pretty_assertions::assert_eq;

    #[test]
    fn test_map() -> Result<(), LinkerError> {
        let mut linker = Linker::new(LinkerConfig::default());
        let sources = [
            ("util.x", ".Print\n  ret\n.N equ 2\n"),
            ("main.x", ".Main\n  call Print\n.loop\n  jr loop\n"),
        ];
        for (name, source) in sources {
            linker.add_program(name, assemble(source, &AssemblerConfig::default()).unwrap())?;
        }
        linker.link_to_vec()?;

        let mut out = Vec::new();
        linker.write_map(&mut out)?;
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Globals\n-------\n\
             $8000 - main.x:Main\n\
             $8005 - util.x:Print\n\
             $2 - util.x:N\n\
             \n\
             main.x\n-------\n\
             $8000 - Main\n\
             $8003 - loop\n\
             \n\
             util.x\n-------\n\
             $8005 - Print\n"
        );
        Ok(())
    }
}
