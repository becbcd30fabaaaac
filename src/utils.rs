#[cfg(windows)]
pub fn setup_console() {
    use windows_sys::Win32::System::Console::{
        GetConsoleMode, GetStdHandle, SetConsoleMode, SetConsoleOutputCP,
        ENABLE_VIRTUAL_TERMINAL_PROCESSING, STD_OUTPUT_HANDLE,
    };
    // Log lines carry Cyrillic uptime strings.
    unsafe {
        SetConsoleOutputCP(65001);
        let handle = GetStdHandle(STD_OUTPUT_HANDLE);
        let mut mode = 0;
        if GetConsoleMode(handle, &mut mode) != 0 {
            SetConsoleMode(handle, mode | ENABLE_VIRTUAL_TERMINAL_PROCESSING);
        }
    }
}

#[cfg(not(windows))]
pub fn setup_console() {}

struct Parts {
    days: u64,
    hours: u64,
    minutes: u64,
    seconds: u64,
}

fn split(seconds: f64) -> Parts {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    Parts {
        days: total / 86_400,
        hours: total % 86_400 / 3_600,
        minutes: total % 3_600 / 60,
        seconds: total % 60,
    }
}

/// Compact duration, largest unit first: `"1d 2h 3m 4s"`.
///
/// Zero units are dropped, but seconds are kept when nothing else is left,
/// so the result is never empty.
pub fn format_duration(seconds: f64) -> String {
    let p = split(seconds);
    let mut parts = Vec::with_capacity(4);
    if p.days > 0 {
        parts.push(format!("{}d", p.days));
    }
    if p.hours > 0 {
        parts.push(format!("{}h", p.hours));
    }
    if p.minutes > 0 {
        parts.push(format!("{}m", p.minutes));
    }
    if p.seconds > 0 || parts.is_empty() {
        parts.push(format!("{}s", p.seconds));
    }
    parts.join(" ")
}

/// Picks the Russian noun form for `n`: one / few / many.
fn plural<'a>(n: u64, one: &'a str, few: &'a str, many: &'a str) -> &'a str {
    match (n % 10, n % 100) {
        (1, r) if r != 11 => one,
        (2..=4, r) if !(12..=14).contains(&r) => few,
        _ => many,
    }
}

/// Human readable uptime with Russian unit names, e.g. `"1 день, 2 часа, 5 минут"`.
///
/// Same unit omission rules as [`format_duration`].
pub fn format_uptime_localized(seconds: f64) -> String {
    let p = split(seconds);
    let mut parts = Vec::with_capacity(4);
    if p.days > 0 {
        parts.push(format!("{} {}", p.days, plural(p.days, "день", "дня", "дней")));
    }
    if p.hours > 0 {
        parts.push(format!("{} {}", p.hours, plural(p.hours, "час", "часа", "часов")));
    }
    if p.minutes > 0 {
        parts.push(format!(
            "{} {}",
            p.minutes,
            plural(p.minutes, "минута", "минуты", "минут")
        ));
    }
    if p.seconds > 0 || parts.is_empty() {
        parts.push(format!(
            "{} {}",
            p.seconds,
            plural(p.seconds, "секунда", "секунды", "секунд")
        ));
    }
    parts.join(", ")
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
