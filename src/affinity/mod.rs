use crate::error::Result;

/// Pins the calling process to `core_id`. Child processes inherit the mask, so
/// every external estimator and SpMV run lands on the same core.
#[cfg(target_os = "linux")]
pub fn set_affinity(core_id: usize) -> Result<()> {
    use crate::error::BenchError;

    if core_id >= libc::CPU_SETSIZE as usize {
        return Err(BenchError::Config(format!("core {} is out of range", core_id)));
    }
    // SAFETY: cpu_set_t is plain data; zeroed is the empty set.
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(core_id, &mut set);
        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
    }
    log::info!("pinned to core {}", core_id);
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn set_affinity(core_id: usize) -> Result<()> {
    log::warn!("cpu pinning is not supported on this platform, ignoring core {}", core_id);
    Ok(())
}
