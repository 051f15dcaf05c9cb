use core::fmt;
use core::fmt::Write;
use spin::Mutex;

/// 控制台输出后端，由嵌入方在启动时注册
pub trait Console: Sync {
    fn put_str(&self, s: &str);
}

static CONSOLE: Mutex<Option<&'static dyn Console>> = Mutex::new(None);
static PRINTK_LOCK: Mutex<()> = Mutex::new(());

pub fn set_console(console: &'static dyn Console) {
    *CONSOLE.lock() = Some(console);
}

struct Sink(&'static dyn Console);

impl fmt::Write for Sink {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.put_str(s);
        Ok(())
    }
}

pub fn _printk(args: fmt::Arguments) {
    let console = *CONSOLE.lock();
    if let Some(console) = console {
        let _guard = PRINTK_LOCK.lock();
        // Sink 不会返回错误
        let _ = Sink(console).write_fmt(args);
    }
}

#[macro_export]
macro_rules! printk {
    ($fmt:expr) => { $crate::printk::_printk(format_args!($fmt)) };
    ($fmt:expr, $($arg:tt)*) => { $crate::printk::_printk(format_args!($fmt, $($arg)*)) };
}

pub const ANSI_RESET: &str = "\x1b[0m";
pub const ANSI_RED: &str = "\x1b[31m";
pub const ANSI_GREEN: &str = "\x1b[32m";
pub const ANSI_YELLOW: &str = "\x1b[33m";
pub const ANSI_BLUE: &str = "\x1b[34m";
pub const ANSI_MAGENTA: &str = "\x1b[35m";
pub const ANSI_CYAN: &str = "\x1b[36m";
pub const ANSI_WHITE: &str = "\x1b[37m";
