use std::fmt::Display;

use memory::FrameId;

use crate::page_table::{Location, PageTable, PageTableError};

/// A process-relative byte address split into page and offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualAddress {
    pub address: usize,
    pub page: usize,
    pub offset: usize,
}

impl VirtualAddress {
    pub fn split(address: usize, page_size: usize) -> Self {
        VirtualAddress {
            address,
            page: address / page_size,
            offset: address % page_size,
        }
    }
}

impl Display for VirtualAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "VA({}) = (page={}, offset={})",
            self.address, self.page, self.offset
        )
    }
}

/// Where a virtual address resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Translation {
    pub virtual_address: VirtualAddress,
    pub location: Location,
}

impl Translation {
    /// The same address once its page sits in RAM `frame`.
    pub fn resolved(self, frame: FrameId) -> Self {
        Translation {
            location: Location::Resident(frame),
            ..self
        }
    }

    pub fn frame(&self) -> FrameId {
        self.location.frame_number()
    }

    pub fn offset(&self) -> usize {
        self.virtual_address.offset
    }

    /// Byte address in RAM, only for resident pages.
    pub fn physical_address(&self, page_size: usize) -> Option<usize> {
        match self.location {
            Location::Resident(frame) => Some(frame * page_size + self.offset()),
            Location::Swapped(_) => None,
        }
    }
}

/// Resolves `address` of `pid` against `table`. Reads only.
pub fn translate(
    table: &PageTable,
    pid: &str,
    address: usize,
) -> Result<Translation, PageTableError> {
    let (_, entry) = table.translate(pid, address)?;
    Ok(Translation {
        virtual_address: VirtualAddress::split(address, table.page_size()),
        location: entry.location(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_va_decomposition() {
        let va = VirtualAddress::split(21, 4);
        assert_eq!(va.page, 5);
        assert_eq!(va.offset, 1);

        let va = VirtualAddress::split(3, 512);
        assert_eq!(va.page, 0);
        assert_eq!(va.offset, 3);
    }

    #[test]
    fn test_translate_resident_and_swapped() {
        let mut table = PageTable::init(4);
        table.register("p1").unwrap();
        table.map("p1", 0, Location::Resident(6)).unwrap();
        table.map("p1", 1, Location::Swapped(2)).unwrap();
        table.set_size("p1", 7).unwrap();

        let t = translate(&table, "p1", 2).unwrap();
        assert_eq!(t.frame(), 6);
        assert_eq!(t.offset(), 2);
        assert_eq!(t.physical_address(4), Some(26));

        let t = translate(&table, "p1", 6).unwrap();
        assert_eq!(t.location, Location::Swapped(2));
        assert_eq!(t.virtual_address.page, 1);
        assert_eq!(t.physical_address(4), None);

        let t = t.resolved(3);
        assert_eq!(t.frame(), 3);
        assert_eq!(t.physical_address(4), Some(14));
    }

    #[test]
    fn test_translate_past_high_water_mark() {
        let mut table = PageTable::init(4);
        table.register("p1").unwrap();
        table.map("p1", 0, Location::Resident(0)).unwrap();
        table.set_size("p1", 3).unwrap();
        assert!(matches!(
            translate(&table, "p1", 3),
            Err(PageTableError::UnmappedAddress { address: 3, .. })
        ));
        assert_eq!(
            translate(&table, "p2", 0),
            Err(PageTableError::UnmappedAddress {
                pid: "p2".to_string(),
                address: 0
            })
        );
    }
}
