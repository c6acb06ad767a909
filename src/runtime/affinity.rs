/// Pins the calling thread to logical core `core % num_cores`.
///
/// Pinning is best effort: on failure (or on platforms without
/// `sched_setaffinity`) the thread simply stays unpinned.
#[cfg(target_os = "linux")]
pub(crate) fn pin_current_thread(core: usize) {
    let num_cores = std::thread::available_parallelism().map_or(1, |n| n.get());

    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(core % num_cores, &mut set);
        libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set);
    }
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn pin_current_thread(_core: usize) {}
