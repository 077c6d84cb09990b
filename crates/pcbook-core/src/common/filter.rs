use crate::{
    common::types::memory_to_bits,
    proto::{Filter, Laptop},
};

impl Filter {
    /// Returns `true` when `laptop` satisfies every populated bound.
    ///
    /// A laptop missing the CPU or RAM section fails any bound on that
    /// section.
    pub fn matches(&self, laptop: &Laptop) -> bool {
        if let Some(max_price) = self.max_price_inr {
            if laptop.price_inr > max_price {
                return false;
            }
        }

        if self.min_cpu_cores.is_some() || self.min_cpu_ghz.is_some() {
            let Some(cpu) = laptop.cpu.as_ref() else {
                return false;
            };
            if self.min_cpu_cores.is_some_and(|min| cpu.number_cores < min) {
                return false;
            }
            if self.min_cpu_ghz.is_some_and(|min| cpu.min_ghz < min) {
                return false;
            }
        }

        if let Some(min_ram) = self.min_ram.as_ref() {
            let Some(ram) = laptop.ram.as_ref() else {
                return false;
            };
            if memory_to_bits(ram) < memory_to_bits(min_ram) {
                return false;
            }
        }

        true
    }
}
