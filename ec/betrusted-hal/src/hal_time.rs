use utralib::generated::*;

const TICKS_PER_MS: u64 = 100;

pub fn time_init() {
    let mut csr = CSR::new(HW_TICKTIMER_BASE as *mut u32);
    csr.wfo(utra::ticktimer::CONTROL_RESET, 1);
}

pub fn get_time_ms() -> u32 {
    let csr = CSR::new(HW_TICKTIMER_BASE as *mut u32);
    let time = raw_ticks(&csr);
    (time / TICKS_PER_MS) as u32
}

fn raw_ticks(csr: &CSR<u32>) -> u64 {
    let lo = csr.r(utra::ticktimer::TIME0) as u64;
    let hi = csr.r(utra::ticktimer::TIME1) as u64;
    lo | (hi << 32)
}

pub fn delay_ms(ms: u32) {
    let start = get_time_ms();
    while get_time_ms() < start.wrapping_add(ms) {}
}

pub fn delay_us(us: u64) {
    let csr = CSR::new(HW_TICKTIMER_BASE as *mut u32);
    let start = raw_ticks(&csr);
    let tick_increment = us / 10; // each tick is 10us at TICKS_PER_MS = 100
    while raw_ticks(&csr) < start + tick_increment {}
}
