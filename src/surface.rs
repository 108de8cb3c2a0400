//! Surface Manager: maps dmabuf fds to backend-owned surface handles.
//!
//! One table keyed by fd, whose value is the full record (fd, gpu address,
//! format, role) -- the redesign from spec 9 that collapses the original's
//! two drifting maps (`fd -> surface-id` and `surface-id -> gpu-addr`) into
//! one.

use crate::error::{ConverterError, ConverterResult};
use crate::format::PixelFormat;
use std::collections::HashMap;

pub type SurfaceId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceRole {
    Input,
    Output,
    Both,
}

/// Per-plane byte offset within the surface's backing allocation, used to
/// reconstruct the GPU address of plane 1+ from plane 0's (spec 9, open
/// question (c)).
#[derive(Debug, Clone, Copy)]
pub struct PlaneLayout {
    pub offset: usize,
    pub stride: u32,
}

/// A backend-owned surface record.
#[derive(Debug, Clone)]
pub struct Surface {
    pub id: SurfaceId,
    pub fd: i32,
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub role: SurfaceRole,
    pub planes: Vec<PlaneLayout>,
    /// Device/GPU virtual address of plane 0, as returned by the native
    /// mapping call. Plane N>0's address is `gpu_address + planes[n].offset`,
    /// which assumes every plane shares one contiguous allocation (spec 9c).
    pub gpu_address: u64,
}

impl Surface {
    pub fn plane_gpu_address(&self, index: usize) -> ConverterResult<u64> {
        let plane = self.planes.get(index).ok_or_else(|| {
            ConverterError::invalid(format!("surface {} has no plane {}", self.id, index))
        })?;
        Ok(self.gpu_address + plane.offset as u64)
    }
}

/// Minimal seam standing in for the native "map fd to device address"
/// ioctl/driver call, so the manager is testable without real hardware.
pub trait SurfaceMapper {
    fn map(&mut self, fd: i32, size: usize) -> ConverterResult<u64>;
    fn unmap(&mut self, gpu_address: u64);
}

/// Software mapper used by tests and the OpenCV/overlay CPU paths, where
/// there is no real device address -- the fd itself is echoed back.
#[derive(Default)]
pub struct IdentityMapper;

impl SurfaceMapper for IdentityMapper {
    fn map(&mut self, fd: i32, _size: usize) -> ConverterResult<u64> {
        Ok(fd as u64)
    }

    fn unmap(&mut self, _gpu_address: u64) {}
}

/// Owns the fd -> [`Surface`] mapping for one backend instance.
pub struct SurfaceManager<M: SurfaceMapper> {
    mapper: M,
    by_fd: HashMap<(i32, SurfaceRoleKey), Surface>,
    next_id: SurfaceId,
    cache_enabled: bool,
}

/// `SurfaceRole` is not `Hash`/`Eq` by derive-friendly convention here since
/// `Both` intentionally collides with neither `Input` nor `Output` in the
/// "at most one live surface per (fd, role)" invariant (spec 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SurfaceRoleKey {
    Input,
    Output,
    Both,
}

impl From<SurfaceRole> for SurfaceRoleKey {
    fn from(r: SurfaceRole) -> Self {
        match r {
            SurfaceRole::Input => SurfaceRoleKey::Input,
            SurfaceRole::Output => SurfaceRoleKey::Output,
            SurfaceRole::Both => SurfaceRoleKey::Both,
        }
    }
}

impl<M: SurfaceMapper> SurfaceManager<M> {
    pub fn new(mapper: M, cache_enabled: bool) -> Self {
        Self {
            mapper,
            by_fd: HashMap::new(),
            next_id: 1,
            cache_enabled,
        }
    }

    pub fn set_cache_enabled(&mut self, enabled: bool) {
        self.cache_enabled = enabled;
    }

    /// Creates a new surface for `fd`, failing with `ResourceExhausted` if
    /// the underlying mapper rejects it.
    pub fn create_surface(
        &mut self,
        fd: i32,
        format: PixelFormat,
        width: u32,
        height: u32,
        role: SurfaceRole,
        planes: Vec<PlaneLayout>,
    ) -> ConverterResult<SurfaceId> {
        let size = planes
            .last()
            .map(|p| p.offset + p.stride as usize * height as usize)
            .unwrap_or(0);
        let gpu_address = self
            .mapper
            .map(fd, size)
            .map_err(|_| ConverterError::exhausted(format!("failed to map fd {fd}")))?;

        let id = self.next_id;
        self.next_id += 1;

        let surface = Surface {
            id,
            fd,
            format,
            width,
            height,
            role,
            planes,
            gpu_address,
        };

        log::debug!(target: "vconv::surface", "created surface {id} for fd {fd} ({width}x{height})");

        // Parked under (fd, role) regardless of `cache_enabled` -- when
        // caching is off the caller is responsible for calling
        // `destroy_surface` right after use instead of relying on reuse.
        self.by_fd.insert((fd, role.into()), surface);

        Ok(id)
    }

    /// Returns the cached surface id for `fd`/`role` if caching is enabled
    /// and one exists, creating it otherwise. This is
    /// `retrieve_surface_id` from spec 4.2.
    pub fn retrieve_surface_id(
        &mut self,
        fd: i32,
        format: PixelFormat,
        width: u32,
        height: u32,
        role: SurfaceRole,
        planes: Vec<PlaneLayout>,
    ) -> ConverterResult<SurfaceId> {
        if self.cache_enabled {
            if let Some(existing) = self.by_fd.get(&(fd, role.into())) {
                return Ok(existing.id);
            }
        }
        self.create_surface(fd, format, width, height, role, planes)
    }

    pub fn get(&self, id: SurfaceId) -> Option<&Surface> {
        self.by_fd.values().find(|s| s.id == id)
    }

    pub fn destroy_surface(&mut self, id: SurfaceId) -> ConverterResult<()> {
        let key = self
            .by_fd
            .iter()
            .find(|(_, s)| s.id == id)
            .map(|(k, _)| *k)
            .ok_or_else(|| ConverterError::invalid(format!("no such surface {id}")))?;

        if let Some(surface) = self.by_fd.remove(&key) {
            self.mapper.unmap(surface.gpu_address);
            log::debug!(target: "vconv::surface", "destroyed surface {id}");
        }
        Ok(())
    }

    pub fn destroy_all(&mut self) {
        for (_, surface) in self.by_fd.drain() {
            self.mapper.unmap(surface.gpu_address);
        }
    }

    pub fn live_count(&self) -> usize {
        self.by_fd.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_retrieve_reuses_when_cached() {
        let mut mgr = SurfaceManager::new(IdentityMapper, true);
        let id1 = mgr
            .retrieve_surface_id(
                3,
                PixelFormat::Nv12,
                64,
                64,
                SurfaceRole::Input,
                vec![PlaneLayout { offset: 0, stride: 64 }],
            )
            .unwrap();
        let id2 = mgr
            .retrieve_surface_id(
                3,
                PixelFormat::Nv12,
                64,
                64,
                SurfaceRole::Input,
                vec![PlaneLayout { offset: 0, stride: 64 }],
            )
            .unwrap();
        assert_eq!(id1, id2);
        assert_eq!(mgr.live_count(), 1);
    }

    #[test]
    fn disabling_cache_still_allows_explicit_destroy() {
        let mut mgr = SurfaceManager::new(IdentityMapper, false);
        let id = mgr
            .create_surface(
                4,
                PixelFormat::Nv12,
                32,
                32,
                SurfaceRole::Output,
                vec![],
            )
            .unwrap();
        assert_eq!(mgr.live_count(), 1);
        mgr.destroy_surface(id).unwrap();
        assert_eq!(mgr.live_count(), 0);
    }

    #[test]
    fn destroy_all_returns_count_to_zero() {
        let mut mgr = SurfaceManager::new(IdentityMapper, true);
        for fd in 0..5 {
            mgr.create_surface(fd, PixelFormat::Gray8, 8, 8, SurfaceRole::Input, vec![])
                .unwrap();
        }
        assert_eq!(mgr.live_count(), 5);
        mgr.destroy_all();
        assert_eq!(mgr.live_count(), 0);
    }

    #[test]
    fn one_surface_per_fd_and_role() {
        let mut mgr = SurfaceManager::new(IdentityMapper, true);
        mgr.create_surface(1, PixelFormat::Gray8, 4, 4, SurfaceRole::Input, vec![])
            .unwrap();
        mgr.create_surface(1, PixelFormat::Gray8, 4, 4, SurfaceRole::Output, vec![])
            .unwrap();
        assert_eq!(mgr.live_count(), 2);
    }

    #[test]
    fn plane1_gpu_address_derived_from_plane0() {
        let mut mgr = SurfaceManager::new(IdentityMapper, true);
        let id = mgr
            .create_surface(
                7,
                PixelFormat::Nv12,
                16,
                16,
                SurfaceRole::Input,
                vec![
                    PlaneLayout { offset: 0, stride: 16 },
                    PlaneLayout { offset: 256, stride: 16 },
                ],
            )
            .unwrap();
        let surface = mgr.get(id).unwrap();
        assert_eq!(surface.plane_gpu_address(0).unwrap(), 7);
        assert_eq!(surface.plane_gpu_address(1).unwrap(), 7 + 256);
    }
}
