mod commit_tests;
