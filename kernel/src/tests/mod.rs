mod switch;
mod util;
