pub mod backend;
pub mod chromedriver;
pub mod elements;
pub mod webdriver;
