pub mod organizations_tests;
pub mod reactor_tests;
