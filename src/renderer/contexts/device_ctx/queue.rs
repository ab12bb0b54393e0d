use ash::vk;

pub struct Queue {
    pub family_index: u32,
    pub handle: vk::Queue,
}

impl Queue {
    pub fn new(family_index: u32, handle: vk::Queue) -> Self {
        Self {
            family_index,
            handle,
        }
    }
}

/// Graphics and present family indices chosen for one adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilySelection {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilySelection {
    /// Picks a graphics family and a present family, preferring one family that does both
    pub fn choose(
        families: &[vk::QueueFamilyProperties],
        supports_present: impl Fn(u32) -> bool,
    ) -> Option<Self> {
        let graphics_families = families
            .iter()
            .enumerate()
            .filter(|(_, props)| props.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .map(|(i, _)| i as u32)
            .collect::<Vec<u32>>();
        let present_families = (0..families.len() as u32)
            .filter(|i| supports_present(*i))
            .collect::<Vec<u32>>();

        if let Some(&shared) = graphics_families.iter().find(|i| present_families.contains(i)) {
            return Some(Self { graphics: shared, present: shared });
        }

        match (graphics_families.first(), present_families.first()) {
            (Some(&graphics), Some(&present)) => Some(Self { graphics, present }),
            _ => None,
        }
    }

    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, graphics first
    pub fn unique_indices(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_prefers_family_supporting_both() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        let selection = QueueFamilySelection::choose(&families, |i| i != 0).unwrap();
        assert_eq!(selection, QueueFamilySelection { graphics: 2, present: 2 });
        assert_eq!(selection.unique_indices(), vec![2]);
    }

    #[test]
    fn test_falls_back_to_separate_families() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
        ];
        let selection = QueueFamilySelection::choose(&families, |i| i == 1).unwrap();
        assert_eq!(selection, QueueFamilySelection { graphics: 0, present: 1 });
        assert!(!selection.is_shared());
        assert_eq!(selection.unique_indices(), vec![0, 1]);
    }

    #[test]
    fn test_no_present_support_rejects_device() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        assert!(QueueFamilySelection::choose(&families, |_| false).is_none());
    }
}
