use crate::types::WorkgroupExtent;

/// Workgroup counts that cover a 2D surface with a fixed per-group extent.
///
/// Counts are rounded up, so the last group on each axis may run past the
/// surface edge; kernels bounds-check against `textureDimensions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchGeometry {
    extent: WorkgroupExtent,
    groups_x: u32,
    groups_y: u32,
}

impl DispatchGeometry {
    pub fn new(width: u32, height: u32, extent: WorkgroupExtent) -> Self {
        debug_assert!(extent.x > 0 && extent.y > 0, "workgroup extent must be non-zero");
        Self {
            extent,
            groups_x: width.div_ceil(extent.x),
            groups_y: height.div_ceil(extent.y),
        }
    }

    /// Group counts in `dispatch_workgroups` argument order.
    pub fn group_counts(&self) -> (u32, u32, u32) {
        (self.groups_x, self.groups_y, 1)
    }

    pub fn extent(&self) -> WorkgroupExtent {
        self.extent
    }

    /// Total invocations launched per dispatch, including out-of-bounds lanes.
    pub fn invocations(&self) -> u64 {
        u64::from(self.groups_x)
            * u64::from(self.groups_y)
            * u64::from(self.extent.invocations())
    }

    /// True when the groups cover `width × height` without a spare row or column of groups.
    pub fn covers(&self, width: u32, height: u32) -> bool {
        let fits = |groups: u32, extent: u32, size: u32| {
            let groups = u64::from(groups);
            let extent = u64::from(extent);
            let size = u64::from(size);
            groups * extent >= size && (groups == 0 || (groups - 1) * extent < size)
        };
        fits(self.groups_x, self.extent.x, width) && fits(self.groups_y, self.extent.y, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_surface_divides_evenly() {
        let geometry = DispatchGeometry::new(512, 512, WorkgroupExtent::EIGHT);
        assert_eq!(geometry.group_counts(), (64, 64, 1));
        assert_eq!(geometry.invocations(), 512 * 512);
    }

    #[test]
    fn partial_groups_round_up() {
        let geometry = DispatchGeometry::new(100, 100, WorkgroupExtent::SIXTEEN);
        assert_eq!(geometry.group_counts(), (7, 7, 1));
        // Last group per axis: lanes 96..112, only 96..100 land on the surface.
        assert!(geometry.covers(100, 100));
        assert_eq!(geometry.invocations(), 112 * 112);
    }

    #[test]
    fn coverage_is_tight_for_all_sizes() {
        for extent in [
            WorkgroupExtent::EIGHT,
            WorkgroupExtent::SIXTEEN,
            WorkgroupExtent::new(32, 4),
        ] {
            for width in 1..=300 {
                let height = 301 - width;
                let geometry = DispatchGeometry::new(width, height, extent);
                let (gx, gy, gz) = geometry.group_counts();
                assert_eq!(gz, 1);
                assert!(gx * extent.x >= width);
                assert!(gy * extent.y >= height);
                assert!((gx - 1) * extent.x < width);
                assert!((gy - 1) * extent.y < height);
                assert!(geometry.covers(width, height));
            }
        }
    }

    #[test]
    fn non_square_extent_uses_each_axis() {
        let geometry = DispatchGeometry::new(1024, 512, WorkgroupExtent::new(32, 4));
        assert_eq!(geometry.group_counts(), (32, 128, 1));
    }

    #[test]
    fn coverage_rejects_other_surfaces() {
        let geometry = DispatchGeometry::new(64, 64, WorkgroupExtent::EIGHT);
        assert!(!geometry.covers(128, 64));
        assert!(!geometry.covers(64, 8));
    }
}
