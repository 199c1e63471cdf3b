use super::{symbols::LabelKind, Linker, LinkerError, ModuleId};

impl Linker {
    /// Put the entry module first and the remaining modules in file name order.
    #[tracing::instrument(skip(self))]
    pub fn order(&mut self) -> Result<(), LinkerError> {
        let entry = self
            .entry
            .ok_or_else(|| LinkerError::NoEntryLabel(self.config.entry.clone()))?;

        let mut rest: Vec<_> = self.modules.iter().filter(|m| m.id != entry).collect();
        rest.sort_by(|a, b| a.fname.cmp(&b.fname));
        if let Some(pair) = rest.windows(2).find(|pair| pair[0].fname == pair[1].fname) {
            return Err(LinkerError::DuplicateModule(pair[0].fname.clone()));
        }

        self.order = std::iter::once(entry)
            .chain(rest.iter().map(|m| m.id))
            .collect::<Vec<ModuleId>>();
        Ok(())
    }

    /// Give every address label its absolute address.
    ///
    /// Modules are laid out back to back from the start address. An `align` marker rounds the
    /// running address up before the labels that follow it.
    #[tracing::instrument(skip(self))]
    pub fn assign_addresses(&mut self) -> Result<(), LinkerError> {
        let mut cursor = self.start_address as u32;

        for id in self.order.clone() {
            let Some(module) = self.module_mut(id) else {
                continue;
            };
            for label in &mut module.labels {
                let offset = label.offset as u32;
                match label.kind {
                    LabelKind::Align(log2) => {
                        let align = 1u32 << log2;
                        let adjust = (cursor + offset) & (align - 1);
                        if adjust > 0 {
                            cursor += align - adjust;
                        }
                    }
                    LabelKind::Address => {
                        if cursor + offset > 0xffff {
                            return Err(LinkerError::ProgramTooBig(module.fname.clone()));
                        }
                        label.addr = (cursor + offset) as u16;
                    }
                    LabelKind::Constant { .. } => {}
                }
            }
            tracing::trace!(module = module.fname.as_str(), cursor, "Placed");
            cursor += module.size as u32;
        }

        Ok(())
    }
}
