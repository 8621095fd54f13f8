// Tests that build a whole heap with `MockVM` live in `mock_tests`. Every test builds its
// own heap, so they can run in parallel; tests that reserve a lot of address space go
// through `serial_test`.

mod mock_tests;
