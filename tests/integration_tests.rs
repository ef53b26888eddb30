mod integration {
    mod catalog_tests;
    mod intersect_tests;
    mod mutate_tests;
}
